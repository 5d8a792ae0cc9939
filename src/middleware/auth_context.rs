use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::{AppState, Role};

/// The verified caller behind a bearer token. Handlers resolve the linked
/// doctor or patient profile from it through `owners::identify`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
    pub session_token_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionLookupRow {
    session_token_id: Uuid,
    user_id: Uuid,
    role: Role,
}

impl From<SessionLookupRow> for AuthContext {
    fn from(row: SessionLookupRow) -> Self {
        AuthContext {
            user_id: row.user_id,
            role: row.role,
            session_token_id: row.session_token_id,
        }
    }
}

/// Live session of an active account, keyed by token hash.
async fn find_session(db: &PgPool, token_hash: &str) -> Result<Option<SessionLookupRow>, sqlx::Error> {
    sqlx::query_as::<_, SessionLookupRow>(
        r#"
        SELECT st.session_token_id, st.user_id, u.role
        FROM session_token st
        JOIN app_user u ON u.user_id = st.user_id
        WHERE st.session_token_hash = $1
          AND st.revoked_at IS NULL
          AND st.expires_at > now()
          AND u.is_active = true
        "#,
    )
    .bind(token_hash)
    .fetch_optional(db)
    .await
}

async fn touch_session(db: &PgPool, session_token_id: Uuid) {
    let touched = sqlx::query(
        r#"UPDATE session_token SET last_seen_at = now() WHERE session_token_id = $1"#,
    )
    .bind(session_token_id)
    .execute(db)
    .await;

    if let Err(e) = touched {
        tracing::warn!(%session_token_id, "could not record session activity: {e}");
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            let row = find_session(&state.db, &hash_access_token(authz.token()))
                .await
                .map_err(|e| {
                    tracing::error!("session lookup failed: {e}");
                    ApiError::Internal(format!("db error: {e}"))
                })?
                .ok_or_else(|| {
                    tracing::debug!("bearer token matches no live session");
                    ApiError::session_expired()
                })?;

            touch_session(&state.db, row.session_token_id).await;

            Ok(AuthContext::from(row))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_session_and_role() {
        let row = SessionLookupRow {
            session_token_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: Role::Receptionist,
        };
        let (sid, uid) = (row.session_token_id, row.user_id);

        let ctx = AuthContext::from(row);
        assert_eq!(ctx.session_token_id, sid);
        assert_eq!(ctx.user_id, uid);
        assert_eq!(ctx.role, Role::Receptionist);
    }
}
