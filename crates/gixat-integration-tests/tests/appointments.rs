//! Appointment booking, slot availability and conversion into a session

mod common;

use chrono::{DateTime, Utc};
use common::{Tenant, TestApp, customer_with_car, exec, exec_err, id, tenant, test_app};
use serde_json::{Value, json};
use uuid::Uuid;

const DAY: &str = "2030-03-04";

const BOOK: &str = r#"mutation($input: CreateAppointmentInput!) {
    createAppointment(input: $input) { appointment { id status serviceRequested } error }
}"#;

fn booking(customer: Uuid, car: Uuid, start: &str, end: &str) -> Value {
    json!({ "input": {
        "customerId": customer,
        "carId": car,
        "scheduledStartTime": format!("{}T{}:00Z", DAY, start),
        "scheduledEndTime": format!("{}T{}:00Z", DAY, end),
        "type": "OIL_CHANGE",
        "serviceRequested": "Oil change\nCheck wipers"
    }})
}

async fn slots(app: &TestApp, t: &Tenant, minutes: i32) -> Vec<DateTime<Utc>> {
    let data = exec(
        app,
        &t.ctx,
        r#"query($date: NaiveDate!, $minutes: Int!) { availableSlots(date: $date, durationMinutes: $minutes) }"#,
        json!({ "date": DAY, "minutes": minutes }),
    )
    .await;
    data["availableSlots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| {
            DateTime::parse_from_rfc3339(v.as_str().unwrap())
                .unwrap()
                .with_timezone(&Utc)
        })
        .collect()
}

fn at(hm: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&format!("{}T{}:00Z", DAY, hm))
        .unwrap()
        .with_timezone(&Utc)
}

#[tokio::test]
async fn test_booking_blocks_overlapping_slots() {
    let app = test_app().await;
    let t = tenant(&app, "book").await;
    let (customer, car) = customer_with_car(&app, &t).await;

    let free = slots(&app, &t, 60).await;
    assert_eq!(free.first(), Some(&at("08:00")));
    assert_eq!(free.last(), Some(&at("17:00")));
    assert_eq!(free.len(), 19);

    let data = exec(&app, &t.ctx, BOOK, booking(customer, car, "10:00", "11:00")).await;
    let payload = &data["createAppointment"];
    assert!(payload["error"].is_null());
    assert_eq!(payload["appointment"]["status"], "SCHEDULED");
    let appointment_id = id(&payload["appointment"]["id"]);

    let free = slots(&app, &t, 60).await;
    assert!(free.contains(&at("09:00")));
    assert!(!free.contains(&at("09:30")));
    assert!(!free.contains(&at("10:00")));
    assert!(!free.contains(&at("10:30")));
    assert!(free.contains(&at("11:00")));

    // Rule violations come back in the payload, not as GraphQL errors
    let (other_customer, other_car) = customer_with_car(&app, &t).await;
    let data = exec(
        &app,
        &t.ctx,
        BOOK,
        booking(other_customer, other_car, "10:30", "11:30"),
    )
    .await;
    assert!(data["createAppointment"]["appointment"].is_null());
    assert_eq!(
        data["createAppointment"]["error"],
        "Time slot is not available"
    );

    // A cancelled appointment frees its slot
    let data = exec(
        &app,
        &t.ctx,
        r#"mutation($id: UUID!) {
            updateAppointmentStatus(id: $id, status: CANCELLED, cancellationReason: "Customer called") {
                status cancellationReason cancelledAt
            }
        }"#,
        json!({ "id": appointment_id }),
    )
    .await;
    assert_eq!(data["updateAppointmentStatus"]["status"], "CANCELLED");
    assert!(!data["updateAppointmentStatus"]["cancelledAt"].is_null());
    assert!(slots(&app, &t, 60).await.contains(&at("10:00")));
}

#[tokio::test]
async fn test_booking_rejects_bad_windows() {
    let app = test_app().await;
    let t = tenant(&app, "window").await;
    let (customer, car) = customer_with_car(&app, &t).await;

    let data = exec(&app, &t.ctx, BOOK, booking(customer, car, "11:00", "10:00")).await;
    assert_eq!(
        data["createAppointment"]["error"],
        "Start time must be before end time"
    );

    let mut past = booking(customer, car, "10:00", "11:00");
    past["input"]["scheduledStartTime"] = json!("2020-01-01T10:00:00Z");
    past["input"]["scheduledEndTime"] = json!("2020-01-01T11:00:00Z");
    let data = exec(&app, &t.ctx, BOOK, past).await;
    assert_eq!(
        data["createAppointment"]["error"],
        "Cannot schedule appointment in the past"
    );

    // A car of another customer is refused
    let (_, someone_elses_car) = customer_with_car(&app, &t).await;
    let data = exec(
        &app,
        &t.ctx,
        BOOK,
        booking(customer, someone_elses_car, "12:00", "13:00"),
    )
    .await;
    assert_eq!(
        data["createAppointment"]["error"],
        "Car not found or does not belong to customer"
    );

    let err = exec_err(
        &app,
        &t.ctx,
        r#"query { availableSlots(date: "2030-03-04", durationMinutes: 5) }"#,
        json!({}),
    )
    .await;
    assert_eq!(err["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_convert_appointment_to_session() {
    let app = test_app().await;
    let t = tenant(&app, "convert").await;
    let (customer, car) = customer_with_car(&app, &t).await;

    let data = exec(&app, &t.ctx, BOOK, booking(customer, car, "14:00", "15:00")).await;
    let appointment_id = data["createAppointment"]["appointment"]["id"].clone();

    let convert = r#"mutation($id: UUID!) {
        convertAppointmentToSession(id: $id) { status session { status customerRequests } }
    }"#;
    let data = exec(&app, &t.ctx, convert, json!({ "id": appointment_id })).await;
    let converted = &data["convertAppointmentToSession"];
    assert_eq!(converted["status"], "IN_PROGRESS");
    assert_eq!(converted["session"]["status"], "INTAKE");
    assert_eq!(
        converted["session"]["customerRequests"],
        "Oil change\nCheck wipers"
    );

    let err = exec_err(&app, &t.ctx, convert, json!({ "id": appointment_id })).await;
    assert_eq!(err["rule"], "AlreadyConverted");

    let data = exec(
        &app,
        &t.ctx,
        r#"query($id: UUID!) { customerUpcomingAppointments(customerId: $id) { id } }"#,
        json!({ "id": customer }),
    )
    .await;
    assert_eq!(
        data["customerUpcomingAppointments"].as_array().unwrap().len(),
        1
    );
}
