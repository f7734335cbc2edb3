//! Registration and login.
//!
//! Registration is the CA bridge: create the off-ledger user, register and
//! enroll with the organization CA, seal the identity into the wallet. A
//! failure after user creation marks the record UNUSABLE and leaves no
//! wallet entry.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use parceltrace_ca::{affiliation, generate_enrollment_secret, RegistrationRequest};
use parceltrace_store::{User, UserStatus};
use parceltrace_types::{CertAttributes, CustodyError};

use crate::dto::{ApiResponse, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<RegisterResponse>>)> {
    let username = request.username.trim();
    if username.is_empty() || request.email.trim().is_empty() || request.full_name.trim().is_empty()
    {
        return Err(CustodyError::invalid_argument(
            "registration",
            "username, email, and fullName are required",
        )
        .into());
    }
    state.passwords.check_strength(&request.password)?;

    let organization = request.role.organization();
    if let Some(current_org) = state.config.org_name {
        // Single-org mode: this instance only enrolls its own roles.
        if !current_org.accepts(request.role) {
            return Err(CustodyError::not_authorized(format!(
                "this gateway serves {}, which does not enroll role {}",
                current_org, request.role
            ))
            .into());
        }
    }

    let user = User {
        user_id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        email: request.email.trim().to_string(),
        password_hash: state.passwords.hash(&request.password)?,
        role: request.role,
        full_name: request.full_name.trim().to_string(),
        address: request.address.clone(),
        company_id: request.company_id.clone(),
        company_name: request.company_name.clone(),
        vehicle_info: request.vehicle_info.clone(),
        status: UserStatus::Active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    state.store.create_user(user.clone()).await?;

    if let Err(err) = enroll_identity(&state, &user).await {
        // Registration without enrolment leaves no usable account behind.
        let _ = state.store.set_user_status(&user.user_id, UserStatus::Unusable).await;
        tracing::warn!(user_id = %user.user_id, "enrolment failed, user marked unusable: {}", err);
        return Err(err.into());
    }

    tracing::info!(
        user_id = %user.user_id,
        username = %user.username,
        role = %user.role,
        org = %organization,
        "user registered and enrolled"
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(RegisterResponse {
            user_id: user.user_id,
            username: user.username,
            role: user.role,
            organization: organization.name().to_string(),
        })),
    ))
}

/// Register with the org CA, enroll, and hand the identity to the wallet.
async fn enroll_identity(state: &AppState, user: &User) -> Result<(), CustodyError> {
    let organization = user.role.organization();
    let ca = state.cas.get(&organization).ok_or_else(|| {
        CustodyError::dependency("ca", format!("no CA configured for {}", organization))
    })?;

    let secret = generate_enrollment_secret();
    ca.register(RegistrationRequest {
        enrollment_id: user.user_id.clone(),
        secret: secret.clone(),
        affiliation: affiliation(organization, user.company_id.as_deref()),
        attributes: CertAttributes {
            user_id: user.user_id.clone(),
            role: user.role,
            company_id: user.company_id.clone(),
            company_name: user.company_name.clone(),
        },
    })
    .await?;

    let enrollment = ca.enroll(&user.user_id, &secret).await?;
    let certificate = enrollment.certificate.encode()?;
    state.wallet.put(
        &user.user_id,
        organization.msp_id(),
        &certificate,
        &enrollment.private_key,
        organization,
        &user.user_id,
    )?;
    Ok(())
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<LoginResponse>>> {
    let user = state
        .store
        .user_by_username(request.username.trim())
        .await?
        .ok_or_else(|| ApiError::from(CustodyError::unauthenticated("unknown user or bad password")))?;

    if user.status != UserStatus::Active {
        return Err(CustodyError::unauthenticated("account is not usable").into());
    }
    if !state.passwords.verify(&request.password, &user.password_hash)? {
        return Err(CustodyError::unauthenticated("unknown user or bad password").into());
    }

    let (token, expires_at) = state.jwt.issue(&user.user_id, user.role)?;
    tracing::info!(user_id = %user.user_id, "user logged in");
    Ok(Json(ApiResponse::ok(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_at,
        user_id: user.user_id,
        role: user.role,
    })))
}
