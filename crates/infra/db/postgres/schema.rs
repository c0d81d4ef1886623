diesel::table! {
    subscriptions (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        status -> Varchar,
        current_tier -> Varchar,
        next_tier -> Nullable<Varchar>,
        current_period_start -> Timestamptz,
        current_period_end -> Timestamptz,
        trial_end_at -> Nullable<Timestamptz>,
        grace_end_at -> Nullable<Timestamptz>,
        last_payment_at -> Nullable<Timestamptz>,
        canceled_at -> Nullable<Timestamptz>,
        cancel_at_period_end -> Bool,
        soft_limited -> Bool,
        soft_limit_reason -> Nullable<Varchar>,
        soft_limit_snapshot -> Nullable<Jsonb>,
        restricted_mode_variant -> Varchar,
        version -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    plan_catalog (id) {
        id -> Uuid,
        tier -> Varchar,
        quotas -> Jsonb,
        monthly_price_minor -> Int4,
        currency -> Varchar,
        effective_from -> Timestamptz,
        effective_to -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    usage_counters (tenant_id, period_key) {
        tenant_id -> Uuid,
        period_key -> Varchar,
        orders -> Int8,
        api_calls -> Int8,
        storage_mb -> Int8,
        plugins -> Int8,
        branches -> Int8,
        admin_users -> Int8,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(subscriptions, plan_catalog, usage_counters);
