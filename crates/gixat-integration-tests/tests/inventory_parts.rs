//! Inventory stock moves driven by job item parts, and labor roll-ups

mod common;

use common::{Tenant, TestApp, exec, exec_err, id, num, reported_session, tenant, test_app};
use serde_json::{Value, json};
use uuid::Uuid;

/// Job card with a single item, returning the item id
async fn job_item(app: &TestApp, t: &Tenant) -> (Uuid, Uuid) {
    let session_id = reported_session(app, t, "Replace brake pads").await;
    let data = exec(
        app,
        &t.ctx,
        r#"mutation($id: UUID!) { createJobCardFromSession(sessionId: $id) { id items { id } } }"#,
        json!({ "id": session_id }),
    )
    .await;
    let card = &data["createJobCardFromSession"];
    (id(&card["id"]), id(&card["items"][0]["id"]))
}

async fn inventory_item(app: &TestApp, t: &Tenant, part_number: &str, quantity: &str) -> Uuid {
    let data = exec(
        app,
        &t.ctx,
        r#"mutation($input: CreateInventoryItemInput!) { createInventoryItem(input: $input) { id unitOfMeasure } }"#,
        json!({ "input": {
            "partNumber": part_number,
            "name": format!("Brake pad set {}", part_number),
            "category": "Brakes",
            "quantityInStock": quantity,
            "minimumStockLevel": "2",
            "costPrice": "8",
            "sellingPrice": "12.50"
        }}),
    )
    .await;
    id(&data["createInventoryItem"]["id"])
}

async fn stock(app: &TestApp, t: &Tenant, item: Uuid) -> f64 {
    let data = exec(
        app,
        &t.ctx,
        r#"query($id: UUID!) { inventoryItemById(id: $id) { quantityInStock } }"#,
        json!({ "id": item }),
    )
    .await;
    num(&data["inventoryItemById"]["quantityInStock"])
}

const ADD_PART: &str = r#"mutation($input: AddPartToJobItemInput!) {
    addPartToJobItem(input: $input) { id unitPrice totalPrice finalPrice }
}"#;

#[tokio::test]
async fn test_actual_parts_take_and_return_stock() {
    let app = test_app().await;
    let t = tenant(&app, "parts").await;
    let (_, item_id) = job_item(&app, &t).await;
    let pads = inventory_item(&app, &t, "BP-100", "5").await;

    // Estimated lines never touch stock
    exec(
        &app,
        &t.ctx,
        ADD_PART,
        json!({ "input": { "jobItemId": item_id, "inventoryItemId": pads, "quantity": "4", "isActual": false } }),
    )
    .await;
    assert_eq!(stock(&app, &t, pads).await, 5.0);

    let data = exec(
        &app,
        &t.ctx,
        ADD_PART,
        json!({ "input": {
            "jobItemId": item_id,
            "inventoryItemId": pads,
            "quantity": "2",
            "discount": "5",
            "isActual": true
        }}),
    )
    .await;
    let part = &data["addPartToJobItem"];
    assert_eq!(num(&part["unitPrice"]), 12.5);
    assert_eq!(num(&part["totalPrice"]), 25.0);
    assert_eq!(num(&part["finalPrice"]), 20.0);
    assert_eq!(stock(&app, &t, pads).await, 3.0);

    let err = exec_err(
        &app,
        &t.ctx,
        ADD_PART,
        json!({ "input": { "jobItemId": item_id, "inventoryItemId": pads, "quantity": "4", "isActual": true } }),
    )
    .await;
    assert_eq!(err["code"], "BUSINESS_RULE_VIOLATION");
    assert_eq!(err["rule"], "InsufficientStock");
    assert_eq!(stock(&app, &t, pads).await, 3.0);

    let data = exec(
        &app,
        &t.ctx,
        r#"mutation($id: UUID!) { removePartFromJobItem(id: $id) }"#,
        json!({ "id": part["id"] }),
    )
    .await;
    assert_eq!(data["removePartFromJobItem"], true);
    assert_eq!(stock(&app, &t, pads).await, 5.0);
}

#[tokio::test]
async fn test_low_stock_and_manual_adjustments() {
    let app = test_app().await;
    let t = tenant(&app, "stock").await;
    let plenty = inventory_item(&app, &t, "OF-1", "10").await;
    let scarce = inventory_item(&app, &t, "OF-2", "1").await;

    let data = exec(&app, &t.ctx, r#"{ lowStockItems { id } }"#, json!({})).await;
    let low: Vec<Value> = data["lowStockItems"].as_array().unwrap().clone();
    assert_eq!(low.len(), 1);
    assert_eq!(id(&low[0]["id"]), scarce);

    let adjust = r#"mutation($id: UUID!, $by: Decimal!) {
        adjustInventoryQuantity(inventoryItemId: $id, adjustment: $by, reason: "Recount") { quantityInStock }
    }"#;
    let err = exec_err(&app, &t.ctx, adjust, json!({ "id": plenty, "by": "-11" })).await;
    assert_eq!(err["rule"], "NegativeStock");

    let data = exec(&app, &t.ctx, adjust, json!({ "id": plenty, "by": "-10" })).await;
    assert_eq!(num(&data["adjustInventoryQuantity"]["quantityInStock"]), 0.0);

    let err = exec_err(
        &app,
        &t.ctx,
        r#"mutation($input: CreateInventoryItemInput!) { createInventoryItem(input: $input) { id } }"#,
        json!({ "input": {
            "partNumber": "OF-1",
            "name": "Duplicate",
            "quantityInStock": "1",
            "minimumStockLevel": "0",
            "costPrice": "1",
            "sellingPrice": "2"
        }}),
    )
    .await;
    assert_eq!(err["rule"], "DuplicateValue");

    let data = exec(
        &app,
        &t.ctx,
        r#"{ searchInventory(term: "of-2") { id } inventoryByCategory(category: "brakes") { id } }"#,
        json!({}),
    )
    .await;
    assert_eq!(data["searchInventory"].as_array().unwrap().len(), 1);
    assert_eq!(data["inventoryByCategory"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_labor_entries_roll_up_per_job_card() {
    let app = test_app().await;
    let t = tenant(&app, "labor").await;
    let (card_id, item_id) = job_item(&app, &t).await;

    let add = r#"mutation($input: AddLaborEntryInput!) {
        addLaborEntry(input: $input) { id hoursWorked totalCost endTime }
    }"#;
    let data = exec(
        &app,
        &t.ctx,
        add,
        json!({ "input": {
            "jobItemId": item_id,
            "technicianId": t.admin.id,
            "startTime": "2030-01-15T08:00:00Z",
            "endTime": "2030-01-15T09:30:00Z",
            "hourlyRate": "20",
            "isActual": true
        }}),
    )
    .await;
    assert_eq!(num(&data["addLaborEntry"]["hoursWorked"]), 1.5);
    assert_eq!(num(&data["addLaborEntry"]["totalCost"]), 30.0);

    let data = exec(
        &app,
        &t.ctx,
        add,
        json!({ "input": {
            "jobItemId": item_id,
            "technicianId": t.admin.id,
            "startTime": "2030-01-15T10:00:00Z",
            "hourlyRate": "20",
            "isActual": true
        }}),
    )
    .await;
    let open_entry = data["addLaborEntry"]["id"].clone();
    assert!(data["addLaborEntry"]["endTime"].is_null());

    let data = exec(&app, &t.ctx, r#"{ activeLaborEntries { id } }"#, json!({})).await;
    assert_eq!(data["activeLaborEntries"].as_array().unwrap().len(), 1);

    let data = exec(
        &app,
        &t.ctx,
        r#"mutation($id: UUID!) {
            clockOutLaborEntry(id: $id, endTime: "2030-01-15T12:00:00Z") { hoursWorked totalCost }
        }"#,
        json!({ "id": open_entry }),
    )
    .await;
    assert_eq!(num(&data["clockOutLaborEntry"]["hoursWorked"]), 2.0);

    let data = exec(
        &app,
        &t.ctx,
        r#"query($id: UUID!) {
            laborSummaryByJobCard(jobCardId: $id) { totalActualHours totalActualCost entryCount }
        }"#,
        json!({ "id": card_id }),
    )
    .await;
    let summary = &data["laborSummaryByJobCard"];
    assert_eq!(num(&summary["totalActualHours"]), 3.5);
    assert_eq!(num(&summary["totalActualCost"]), 70.0);
    assert_eq!(summary["entryCount"], 2);
}
