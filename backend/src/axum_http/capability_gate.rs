use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use crates::domain::{
    repositories::{
        plans::PlanCatalogRepository, subscriptions::SubscriptionRepository,
        usage_counters::UsageCounterRepository,
    },
    value_objects::entitlements::{Capability, CapabilityDecision},
};
use serde::Serialize;
use tracing::{error, info};

use crate::{auth::AuthTenant, axum_http::error_responses, usecases::entitlements::EntitlementUseCase};

/// Request interceptor configured per guarded route. Resolves the tenant's
/// subscription and entitlements and short-circuits denied requests before
/// they reach domain logic, so no partial side effects occur.
pub struct CapabilityGate<S, P, U>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    usecase: Arc<EntitlementUseCase<S, P, U>>,
    capability: Capability,
}

impl<S, P, U> CapabilityGate<S, P, U>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    pub fn new(usecase: Arc<EntitlementUseCase<S, P, U>>, capability: Capability) -> Self {
        Self {
            usecase,
            capability,
        }
    }
}

impl<S, P, U> Clone for CapabilityGate<S, P, U>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            usecase: Arc::clone(&self.usecase),
            capability: self.capability,
        }
    }
}

/// The stable machine-readable body denied requests carry, so the
/// presentation layer can render tier-appropriate messaging without
/// re-deriving subscription state.
#[derive(Debug, Serialize)]
pub struct DenyResponse {
    pub code: &'static str,
    pub dimension: Option<String>,
    pub message: String,
}

pub async fn require_capability<S, P, U>(
    State(gate): State<CapabilityGate<S, P, U>>,
    AuthTenant { tenant_id, .. }: AuthTenant,
    request: Request,
    next: Next,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    match gate.usecase.check(tenant_id, gate.capability, Utc::now()).await {
        Ok(CapabilityDecision::Allow) => next.run(request).await,
        Ok(CapabilityDecision::Deny { code, dimension }) => {
            info!(%tenant_id, capability = %gate.capability, code = %code, "capability_gate: request denied");
            (
                StatusCode::FORBIDDEN,
                Json(DenyResponse {
                    code: code.as_str(),
                    dimension: dimension.map(|d| d.to_string()),
                    message: format!("capability {} is not available", gate.capability),
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!(%tenant_id, capability = %gate.capability, error = %err, "capability_gate: resolution failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::header::AUTHORIZATION, routing::post};
    use chrono::Duration;
    use crates::domain::{
        entities::{plans::PlanCatalogEntry, subscriptions::SubscriptionEntity},
        repositories::{
            plans::MockPlanCatalogRepository, subscriptions::MockSubscriptionRepository,
            usage_counters::MockUsageCounterRepository,
        },
        value_objects::{entitlements::QuotaLimits, enums::tiers::Tier},
    };
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use tower::ServiceExt;
    use uuid::Uuid;

    const TEST_SECRET: &str = "supersecretjwtsecretforunittesting123";

    fn bearer_for(tenant_id: Uuid) -> String {
        unsafe {
            std::env::set_var("BILLING_JWT_SECRET", TEST_SECRET);
        }
        let claims = crate::auth::TenantClaims {
            sub: tenant_id.to_string(),
            role: "tenant".to_string(),
            exp: 9999999999,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        format!("Bearer {token}")
    }

    fn entity(tenant_id: Uuid, status: &str) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            tenant_id,
            status: status.to_string(),
            current_tier: "C1".to_string(),
            next_tier: None,
            current_period_start: now - Duration::days(5),
            current_period_end: now + Duration::days(25),
            trial_end_at: None,
            grace_end_at: None,
            last_payment_at: if status == "active_paid" {
                Some(now - Duration::days(5))
            } else {
                None
            },
            canceled_at: None,
            cancel_at_period_end: false,
            soft_limited: false,
            soft_limit_reason: None,
            soft_limit_snapshot: None,
            restricted_mode_variant: "catalog_only".to_string(),
            version: 1,
            created_at: now,
        }
    }

    fn plan() -> PlanCatalogEntry {
        PlanCatalogEntry {
            id: Uuid::new_v4(),
            tier: Tier::C1,
            quotas: QuotaLimits {
                orders_per_month: 100,
                api_calls_per_month: 10_000,
                storage_mb: 512,
                plugins_max: 3,
                branches_max: 1,
                admin_users_max: 2,
            },
            monthly_price_minor: 900,
            currency: "USD".to_string(),
            effective_from: Utc::now() - Duration::days(365),
            effective_to: None,
        }
    }

    fn app_with(status: &'static str, capability: Capability) -> (Router, Uuid) {
        let tenant_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_find_by_tenant_id().returning(move |id| {
            let entity = entity(id, status);
            Box::pin(async move { Ok(Some(entity)) })
        });

        let mut plan_repo = MockPlanCatalogRepository::new();
        plan_repo
            .expect_find_effective_by_tier()
            .returning(|_, _| Box::pin(async { Ok(plan()) }));

        let mut usage_repo = MockUsageCounterRepository::new();
        usage_repo
            .expect_find()
            .returning(|_, _| Box::pin(async { Ok(None) }));

        let usecase = EntitlementUseCase::new(
            Arc::new(subscription_repo),
            Arc::new(plan_repo),
            Arc::new(usage_repo),
        );
        let gate = CapabilityGate::new(Arc::new(usecase), capability);

        let app = Router::new()
            .route("/orders", post(|| async { "created" }))
            .layer(axum::middleware::from_fn_with_state(gate, require_capability));

        (app, tenant_id)
    }

    fn order_request(tenant_id: Uuid) -> Request {
        Request::builder()
            .method("POST")
            .uri("/orders")
            .header(AUTHORIZATION, bearer_for(tenant_id))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn allowed_request_passes_through() {
        let (app, tenant_id) = app_with("active_paid", Capability::OrderCreate);

        let response = app.oneshot(order_request(tenant_id)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn restricted_tenant_is_short_circuited_with_machine_readable_code() {
        let (app, tenant_id) = app_with("restricted", Capability::OrderCreate);

        let response = app.oneshot(order_request(tenant_id)).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["code"], "SUBSCRIPTION_RESTRICTED");
    }

    #[tokio::test]
    async fn missing_bearer_token_is_unauthorized() {
        let (app, _) = app_with("active_paid", Capability::OrderCreate);

        let request = Request::builder()
            .method("POST")
            .uri("/orders")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
