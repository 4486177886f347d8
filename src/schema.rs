// Column order follows the tables created by `registry::ddl`: the identity
// key, the declared fields, then foreign keys in declaration order.

diesel::table! {
    accounts (id) {
        id -> Uuid,
        email -> Varchar,
        password_hash -> Varchar,
        title -> Nullable<Varchar>,
        first_name -> Varchar,
        last_name -> Varchar,
        role -> Varchar,
        status -> Varchar,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    refresh_tokens (id) {
        id -> Uuid,
        token_hash -> Varchar,
        expires_at -> Timestamp,
        created_at -> Timestamp,
        created_by_ip -> Nullable<Varchar>,
        revoked_at -> Nullable<Timestamp>,
        account_id -> Uuid,
    }
}

diesel::table! {
    departments (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Nullable<Varchar>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    employees (id) {
        id -> Uuid,
        employee_code -> Varchar,
        position -> Varchar,
        hire_date -> Timestamp,
        status -> Varchar,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        account_id -> Uuid,
        department_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    requests (id) {
        id -> Uuid,
        request_type -> Varchar,
        status -> Varchar,
        description -> Nullable<Varchar>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        employee_id -> Uuid,
        approver_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    request_items (id) {
        id -> Uuid,
        name -> Varchar,
        quantity -> Int4,
        created_at -> Timestamp,
        request_id -> Uuid,
    }
}

diesel::table! {
    workflows (id) {
        id -> Uuid,
        workflow_type -> Varchar,
        details -> Jsonb,
        status -> Varchar,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        employee_id -> Uuid,
    }
}

diesel::joinable!(refresh_tokens -> accounts (account_id));
diesel::joinable!(employees -> accounts (account_id));
diesel::joinable!(employees -> departments (department_id));
diesel::joinable!(requests -> employees (employee_id));
diesel::joinable!(request_items -> requests (request_id));
diesel::joinable!(workflows -> employees (employee_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    refresh_tokens,
    departments,
    employees,
    requests,
    request_items,
    workflows,
);
