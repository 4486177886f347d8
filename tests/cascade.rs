//! Delete policies across the whole relation graph.

mod common;

use approvals::store::StoreError;
use common::{id_of, TestApp};
use diesel::RunQueryDsl;
use serde_json::Value;
use serial_test::serial;

async fn execute(app: &TestApp, sql: &'static str) {
    app.store
        .run("test.execute", move |store| {
            store.with_conn(|conn| {
                diesel::sql_query(sql).execute(conn)?;
                Ok::<_, StoreError>(())
            })
        })
        .await
        .expect("statement failed");
}

#[tokio::test]
#[serial]
async fn deleting_account_removes_everything_it_owns() {
    let app = TestApp::spawn().await;
    let department = app.create_department("Engineering").await;
    let (account, employee) = app.create_staff(Some(&id_of(&department))).await;
    let employee_id = id_of(&employee);
    app.create_request(&employee_id, None, &[("Laptop", 1), ("Dock", 1)])
        .await;
    app.create_request(&employee_id, None, &[("Chair", 1)]).await;
    app.post(
        &format!("/accounts/{}/refresh-tokens", id_of(&account)),
        serde_json::json!({}),
    )
    .await;

    let response = app.delete(&format!("/accounts/{}", id_of(&account))).await;

    assert_status!(response, 200);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["entity"], "Account");
    assert_eq!(report["removed"]["Employee"], 1);
    assert_eq!(report["removed"]["Request"], 2);
    assert_eq!(report["removed"]["RequestItem"], 3);
    assert_eq!(report["removed"]["Workflow"], 2);
    assert_eq!(report["removed"]["RefreshToken"], 1);

    assert_status!(app.get(&format!("/employees/{}", employee_id)).await, 404);
    let requests = app.get_json("/requests").await;
    assert_eq!(requests["pagination"]["total_count"], 0);
    let workflows = app.get_json("/workflows").await;
    assert_eq!(workflows["pagination"]["total_count"], 0);

    // The department is the owner side of a nullify link and survives.
    let department = app
        .get_json(&format!("/departments/{}", id_of(&department)))
        .await;
    assert_eq!(department["name"], "Engineering");
}

#[tokio::test]
#[serial]
async fn deleting_employee_keeps_their_account() {
    let app = TestApp::spawn().await;
    let (account, employee) = app.create_staff(None).await;
    app.create_request(&id_of(&employee), None, &[("Mouse", 1)])
        .await;

    let response = app
        .delete(&format!("/employees/{}", id_of(&employee)))
        .await;

    assert_status!(response, 200);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["removed"]["Request"], 1);
    assert_eq!(report["removed"]["RequestItem"], 1);

    let body = app
        .get_json(&format!("/accounts/{}/employee", id_of(&account)))
        .await;
    assert!(body["employee"].is_null());
}

#[tokio::test]
#[serial]
async fn deleting_request_removes_only_its_items() {
    let app = TestApp::spawn().await;
    let (_, employee) = app.create_staff(None).await;
    let doomed = app
        .create_request(&id_of(&employee), None, &[("A", 1), ("B", 1)])
        .await;
    let kept = app
        .create_request(&id_of(&employee), None, &[("C", 1)])
        .await;

    let response = app.delete(&format!("/requests/{}", id_of(&doomed))).await;

    assert_status!(response, 200);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["removed"]["RequestItem"], 2);

    let items = app
        .get_json(&format!("/requests/{}/items", id_of(&kept)))
        .await;
    assert_eq!(items.as_array().unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn deleting_missing_row_is_not_found_and_changes_nothing() {
    let app = TestApp::spawn().await;
    let (_, employee) = app.create_staff(None).await;

    let response = app
        .delete(&format!("/accounts/{}", uuid::Uuid::new_v4()))
        .await;

    assert_status!(response, 404);
    assert_status!(app.get(&format!("/employees/{}", id_of(&employee))).await, 200);
}

#[tokio::test]
#[serial]
async fn deleting_engineer_removes_requests_and_items_but_not_account_or_department() {
    let app = TestApp::spawn().await;
    let engineering = app.create_department("Engineering").await;
    let (account, alice) = app.create_staff(Some(&id_of(&engineering))).await;
    let request = app
        .create_request(&id_of(&alice), None, &[("Laptop", 1), ("Monitor", 2)])
        .await;

    let response = app.delete(&format!("/employees/{}", id_of(&alice))).await;

    assert_status!(response, 200);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["entity"], "Employee");
    assert_eq!(report["removed"]["Request"], 1);
    assert_eq!(report["removed"]["RequestItem"], 2);

    assert_status!(app.get(&format!("/requests/{}", id_of(&request))).await, 404);
    assert_status!(
        app.get(&format!("/requests/{}/items", id_of(&request))).await,
        404
    );
    let requests = app.get_json("/requests").await;
    assert_eq!(requests["pagination"]["total_count"], 0);

    assert_status!(app.get(&format!("/accounts/{}", id_of(&account))).await, 200);
    let department = app
        .get_json(&format!("/departments/{}", id_of(&engineering)))
        .await;
    assert_eq!(department["name"], "Engineering");
    let members = app
        .get_json(&format!("/departments/{}/employees", id_of(&engineering)))
        .await;
    assert!(members.as_array().unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn deleting_account_twice_is_not_found() {
    let app = TestApp::spawn().await;
    let (account, _) = app.create_staff(None).await;
    let path = format!("/accounts/{}", id_of(&account));

    assert_status!(app.delete(&path).await, 200);

    let response = app.delete(&path).await;
    assert_status!(response, 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ACCOUNT_NOT_FOUND");
}

#[tokio::test]
#[serial]
async fn failed_cascade_leaves_every_row_in_place() {
    let app = TestApp::spawn().await;
    let (_, employee) = app.create_staff(None).await;
    let request = app
        .create_request(&id_of(&employee), None, &[("Laptop", 1), ("Dock", 1)])
        .await;

    execute(
        &app,
        "CREATE OR REPLACE FUNCTION refuse_item_delete() RETURNS trigger AS $$ \
         BEGIN RAISE EXCEPTION 'request items are locked'; END; $$ LANGUAGE plpgsql",
    )
    .await;
    execute(
        &app,
        "CREATE TRIGGER refuse_item_delete BEFORE DELETE ON request_items \
         FOR EACH ROW EXECUTE FUNCTION refuse_item_delete()",
    )
    .await;

    let response = app
        .delete(&format!("/employees/{}", id_of(&employee)))
        .await;

    execute(&app, "DROP TRIGGER refuse_item_delete ON request_items").await;
    execute(&app, "DROP FUNCTION refuse_item_delete()").await;

    assert_status!(response, 500);
    assert_status!(app.get(&format!("/employees/{}", id_of(&employee))).await, 200);
    let items = app
        .get_json(&format!("/requests/{}/items", id_of(&request)))
        .await;
    assert_eq!(items.as_array().unwrap().len(), 2);
    let workflows = app
        .get_json(&format!("/workflows?employee_id={}", id_of(&employee)))
        .await;
    assert_eq!(workflows["pagination"]["total_count"], 1);
}
