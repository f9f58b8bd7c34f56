use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::{
    auth::auth::AuthUser,
    models::{Claims, TokenType},
};

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

fn claims_for(user: &AuthUser, token_type: TokenType, ttl: usize) -> Claims {
    Claims {
        user_id: user.user_id,
        sub: user.email.clone(),
        company_id: user.company_id.0,
        role: user.role.to_string(),
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        employee_id: user.employee_id.map(|e| e.0),
    }
}

pub fn generate_access_token(user: &AuthUser, secret: &str, ttl: usize) -> Result<String, Error> {
    let claims = claims_for(user, TokenType::Access, ttl);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn generate_refresh_token(
    user: &AuthUser,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = claims_for(user, TokenType::Refresh, ttl);
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{company::CompanyId, employee::EmployeeId, role::Role};

    fn ana() -> AuthUser {
        AuthUser {
            user_id: 7,
            email: "ana@acme.com".to_string(),
            company_id: CompanyId(3),
            role: Role::Employee,
            employee_id: Some(EmployeeId(10)),
        }
    }

    #[test]
    fn access_token_carries_tenant_and_role() {
        let token = generate_access_token(&ana(), "secret", 60).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.company_id, 3);
        assert_eq!(claims.role, "employee");
        assert_eq!(claims.employee_id, Some(10));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, claims) = generate_refresh_token(&ana(), "secret", 60).unwrap();
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert!(verify_token(&token, "other").is_err());
    }
}
