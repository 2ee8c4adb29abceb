//! Common test utilities for integration tests

use async_graphql::{Request, Response, Variables};
use gixat_api::{ApiSettings, GixatSchema, JwtSettings, Services, TokenService, build_schema};
use gixat_core::models::{NewOrganization, NewUser, User, UserRole, UserType};
use gixat_core::store::{OrganizationStore, UserStore};
use gixat_core::{GarageStore, OrganizationId, RequestContext};
use gixat_media::{DisabledScanner, MemoryObjectStore, UploadPipeline, VirusScanner};
use gixat_observability::Metrics;
use gixat_store_sqlite::SqliteGarageStore;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

pub const SIGNING_KEY: &str = "integration-test-signing-key-0123456789";

/// Schema plus handles on its backing stores
#[allow(dead_code)]
pub struct TestApp {
    pub schema: GixatSchema,
    pub services: Services,
    pub store: Arc<SqliteGarageStore>,
    pub objects: Arc<MemoryObjectStore>,
}

/// One organization with an admin acting inside it
#[allow(dead_code)]
pub struct Tenant {
    pub org: OrganizationId,
    pub admin: User,
    pub ctx: RequestContext,
}

pub async fn test_app() -> TestApp {
    test_app_with_scanner(Arc::new(DisabledScanner)).await
}

pub async fn test_app_with_scanner(scanner: Arc<dyn VirusScanner>) -> TestApp {
    let store = Arc::new(SqliteGarageStore::in_memory().await.unwrap());
    let objects = Arc::new(MemoryObjectStore::with_base_url("https://objects.test"));
    let metrics = Arc::new(Metrics::new().unwrap());
    let services = Services {
        store: store.clone() as Arc<dyn GarageStore>,
        pipeline: UploadPipeline::new(objects.clone(), scanner).with_metrics(metrics.clone()),
        tokens: TokenService::new(JwtSettings {
            key: SIGNING_KEY.to_string(),
            issuer: "gixat".to_string(),
            audience: "gixat-app".to_string(),
            expire_days: 7,
        }),
        metrics,
        settings: ApiSettings::default(),
    };
    TestApp {
        schema: build_schema(&services),
        services,
        store,
        objects,
    }
}

/// Create an organization and a user with `role` inside it
pub async fn member(app: &TestApp, org: OrganizationId, email: &str, role: UserRole) -> User {
    app.store
        .create_user(NewUser {
            email: email.to_string(),
            full_name: email.split('@').next().unwrap_or(email).to_string(),
            password_hash: "unused".to_string(),
            user_type: UserType::Organizational,
            role,
            organization_id: Some(*org.as_uuid()),
        })
        .await
        .unwrap()
}

#[allow(dead_code)]
pub fn context_for(user: &User) -> RequestContext {
    RequestContext::for_user(
        user.id,
        user.organization_id.map(OrganizationId::from_uuid),
        vec![user.role],
    )
}

pub async fn tenant(app: &TestApp, tag: &str) -> Tenant {
    let org = app
        .store
        .create_organization(
            NewOrganization {
                name: format!("Garage {}", tag),
                country: "Jordan".into(),
                city: "Amman".into(),
                street: "Main St".into(),
                phone_country_code: "962".into(),
                logo_key: None,
                logo_alt: None,
            },
            None,
        )
        .await
        .unwrap();
    let org = OrganizationId::from_uuid(org.id);
    let admin = member(app, org, &format!("admin@{}.test", tag), UserRole::OrgAdmin).await;
    let ctx = RequestContext::for_user(admin.id, Some(org), vec![UserRole::OrgAdmin]);
    Tenant { org, admin, ctx }
}

pub async fn run(app: &TestApp, ctx: &RequestContext, query: &str, variables: Value) -> Response {
    let request = Request::new(query)
        .variables(Variables::from_json(variables))
        .data(ctx.clone());
    app.schema.execute(request).await
}

/// Execute and return `data`, failing the test on any GraphQL error
pub async fn exec(app: &TestApp, ctx: &RequestContext, query: &str, variables: Value) -> Value {
    let response = run(app, ctx, query, variables).await;
    assert!(
        response.errors.is_empty(),
        "unexpected errors for {}: {:?}",
        query,
        response.errors
    );
    response.data.into_json().unwrap()
}

/// Execute and return the extensions (`code`, `rule`) of the first error
#[allow(dead_code)]
pub async fn exec_err(app: &TestApp, ctx: &RequestContext, query: &str, variables: Value) -> Value {
    let response = run(app, ctx, query, variables).await;
    let error = response
        .errors
        .first()
        .unwrap_or_else(|| panic!("expected an error for {}", query));
    serde_json::to_value(&error.extensions).unwrap()
}

pub fn id(value: &Value) -> Uuid {
    value.as_str().unwrap().parse().unwrap()
}

/// Numeric value of a `Decimal` field, which GraphQL returns as a string
#[allow(dead_code)]
pub fn num(value: &Value) -> f64 {
    value.as_str().unwrap().parse().unwrap()
}

/// Customer with one car, created through the API
pub async fn customer_with_car(app: &TestApp, tenant: &Tenant) -> (Uuid, Uuid) {
    let tag = Uuid::new_v4().simple().to_string();
    let data = exec(
        app,
        &tenant.ctx,
        r#"mutation($input: CreateCustomerInput!) { createCustomer(input: $input) { id } }"#,
        json!({ "input": {
            "firstName": "Layla",
            "lastName": "Haddad",
            "phoneNumber": format!("079{}", &tag[..7]),
            "email": format!("layla.{}@example.com", &tag[..8])
        }}),
    )
    .await;
    let customer_id = id(&data["createCustomer"]["id"]);

    let data = exec(
        app,
        &tenant.ctx,
        r#"mutation($input: CreateCarInput!) { createCar(input: $input) { id } }"#,
        json!({ "input": {
            "customerId": customer_id,
            "make": "Toyota",
            "model": "Corolla",
            "year": 2019,
            "licensePlate": format!("AB-{}", &tag[..6])
        }}),
    )
    .await;
    (customer_id, id(&data["createCar"]["id"]))
}

/// Session walked through intake, inspection and the initial report
#[allow(dead_code)]
pub async fn reported_session(app: &TestApp, tenant: &Tenant, requests: &str) -> Uuid {
    let (customer_id, car_id) = customer_with_car(app, tenant).await;
    let data = exec(
        app,
        &tenant.ctx,
        r#"mutation($car: UUID!, $customer: UUID!) {
            createSession(carId: $car, customerId: $customer) { id status }
        }"#,
        json!({ "car": car_id, "customer": customer_id }),
    )
    .await;
    let session_id = id(&data["createSession"]["id"]);

    exec(
        app,
        &tenant.ctx,
        r#"mutation($id: UUID!, $requests: String) {
            updateIntake(sessionId: $id, mileage: 42000, customerRequests: $requests) { status }
        }"#,
        json!({ "id": session_id, "requests": requests }),
    )
    .await;
    exec(
        app,
        &tenant.ctx,
        r#"mutation($id: UUID!) {
            generateInitialReport(sessionId: $id, report: "Ready for work") { status }
        }"#,
        json!({ "id": session_id }),
    )
    .await;
    session_id
}
