diesel::table! {
    payment_intents (id) {
        id -> Uuid,
        phone_number -> Varchar,
        amount -> Numeric,
        account_reference -> Varchar,
        transaction_desc -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    gateway_acknowledgments (id) {
        id -> Uuid,
        intent_id -> Uuid,
        merchant_request_id -> Varchar,
        checkout_request_id -> Varchar,
        response_code -> Varchar,
        response_description -> Varchar,
        customer_message -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    callback_records (id) {
        id -> Uuid,
        acknowledgment_id -> Uuid,
        result_code -> Nullable<Int8>,
        result_description -> Varchar,
        receipt_number -> Nullable<Varchar>,
        transaction_date -> Nullable<Timestamptz>,
        phone_number -> Nullable<Varchar>,
        amount -> Nullable<Numeric>,
        metadata -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(gateway_acknowledgments -> payment_intents (intent_id));
diesel::joinable!(callback_records -> gateway_acknowledgments (acknowledgment_id));

diesel::allow_tables_to_appear_in_same_query!(
    payment_intents,
    gateway_acknowledgments,
    callback_records,
);
