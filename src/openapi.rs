//! OpenAPI documentation served through Swagger UI.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::pagination::PaginationMeta;
use crate::store::DeleteReport;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Approvals API",
        version = "1.0.0",
        description = "Employee request and approval workflows.\n\n\
        ## Relations\n\
        - An account has at most one employee; deleting the account deletes the employee\n\
        - Deleting an employee deletes their requests and workflow history\n\
        - Deleting a department keeps its employees without a department\n\
        - Deleting an approver keeps their requests without an approver\n\n\
        ## Errors\n\
        Every failure returns `{\"error\", \"code\"}` with optional per-field `details`.\n\
        Validation failures are 400, missing records 404, dangling references 422\n\
        and an unreachable database 503.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Accounts", description = "Login identities and their relations"),
        (name = "Refresh Tokens", description = "Stored refresh tokens"),
        (name = "Departments", description = "Organisational units"),
        (name = "Employees", description = "Employees and department transfers"),
        (name = "Requests", description = "Requests, their items and approvers"),
        (name = "Workflows", description = "Workflow history records")
    ),
    paths(
        crate::handlers::health::health_check_simple,
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,

        crate::handlers::accounts::create_account,
        crate::handlers::accounts::list_accounts,
        crate::handlers::accounts::get_account,
        crate::handlers::accounts::update_account,
        crate::handlers::accounts::delete_account,
        crate::handlers::accounts::get_account_employee,
        crate::handlers::accounts::list_approved_requests,
        crate::handlers::accounts::list_account_refresh_tokens,
        crate::handlers::accounts::issue_refresh_token,

        crate::handlers::refresh_tokens::list_refresh_tokens,
        crate::handlers::refresh_tokens::get_refresh_token,
        crate::handlers::refresh_tokens::revoke_refresh_token,
        crate::handlers::refresh_tokens::delete_refresh_token,

        crate::handlers::departments::create_department,
        crate::handlers::departments::list_departments,
        crate::handlers::departments::get_department,
        crate::handlers::departments::update_department,
        crate::handlers::departments::delete_department,
        crate::handlers::departments::list_department_employees,

        crate::handlers::employees::create_employee,
        crate::handlers::employees::list_employees,
        crate::handlers::employees::get_employee,
        crate::handlers::employees::update_employee,
        crate::handlers::employees::transfer_employee,
        crate::handlers::employees::delete_employee,
        crate::handlers::employees::get_employee_account,
        crate::handlers::employees::get_employee_department,
        crate::handlers::employees::list_employee_requests,
        crate::handlers::employees::list_employee_workflows,

        crate::handlers::requests::create_request,
        crate::handlers::requests::list_requests,
        crate::handlers::requests::get_request,
        crate::handlers::requests::update_request,
        crate::handlers::requests::delete_request,
        crate::handlers::requests::get_request_approver,
        crate::handlers::requests::get_request_employee,
        crate::handlers::requests::list_request_items,
        crate::handlers::requests::add_request_item,
        crate::handlers::requests::update_request_item,
        crate::handlers::requests::remove_request_item,

        crate::handlers::workflows::create_workflow,
        crate::handlers::workflows::list_workflows,
        crate::handlers::workflows::get_workflow,
        crate::handlers::workflows::update_workflow,
        crate::handlers::workflows::delete_workflow,
    ),
    components(
        schemas(
            ApiError,
            DeleteReport,
            PaginationMeta,

            crate::models::AccountRole,
            crate::models::RecordStatus,
            crate::models::RequestStatus,
            crate::models::WorkflowStatus,

            crate::handlers::health::HealthResponse,
            crate::handlers::health::ReadinessResponse,
            crate::handlers::health::ReadinessChecks,
            crate::handlers::health::ComponentStatus,

            crate::models::Account,
            crate::handlers::accounts::CreateAccountRequest,
            crate::handlers::accounts::UpdateAccountRequest,
            crate::handlers::accounts::AccountListResponse,
            crate::handlers::accounts::AccountEmployeeResponse,
            crate::handlers::accounts::IssuedTokenResponse,

            crate::models::RefreshToken,
            crate::handlers::refresh_tokens::RefreshTokenListResponse,

            crate::models::Department,
            crate::handlers::departments::CreateDepartmentRequest,
            crate::handlers::departments::UpdateDepartmentRequest,
            crate::handlers::departments::DepartmentWithCount,
            crate::handlers::departments::DepartmentListResponse,

            crate::models::Employee,
            crate::handlers::employees::CreateEmployeeRequest,
            crate::handlers::employees::UpdateEmployeeRequest,
            crate::handlers::employees::TransferRequest,
            crate::handlers::employees::TransferResponse,
            crate::handlers::employees::EmployeeListResponse,
            crate::handlers::employees::EmployeeDepartmentResponse,

            crate::models::Request,
            crate::models::RequestItem,
            crate::handlers::requests::ItemPayload,
            crate::handlers::requests::CreateRequestRequest,
            crate::handlers::requests::UpdateRequestRequest,
            crate::handlers::requests::UpdateItemRequest,
            crate::handlers::requests::RequestResponse,
            crate::handlers::requests::CreatedRequestResponse,
            crate::handlers::requests::RequestListResponse,
            crate::handlers::requests::RequestApproverResponse,

            crate::models::Workflow,
            crate::handlers::workflows::CreateWorkflowRequest,
            crate::handlers::workflows::UpdateWorkflowRequest,
            crate::handlers::workflows::WorkflowListResponse,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Approvals API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_has_tags() {
        let spec = ApiDoc::openapi();
        let tags = spec.tags.expect("tags");
        for name in ["Health", "Accounts", "Departments", "Employees", "Requests", "Workflows"] {
            assert!(tags.iter().any(|t| t.name == name), "missing tag {name}");
        }
    }

    #[test]
    fn test_openapi_lists_relation_paths() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/requests/{id}/items/{item_id}"));
        assert!(spec.paths.paths.contains_key("/employees/{id}/transfer"));
        assert!(spec.paths.paths.contains_key("/accounts/{id}/approved-requests"));
    }

    #[test]
    fn test_openapi_registers_error_schema() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.schemas.contains_key("ApiError"));
        assert!(components.schemas.contains_key("DeleteReport"));
    }
}
