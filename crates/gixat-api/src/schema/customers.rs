use async_graphql::{Context, Object, Result, ResultExt};
use chrono::Utc;
use gixat_core::export::customers_csv_base64;
use gixat_core::graphql::{store, tenant};
use gixat_core::models::{
    Car, CarUpdate, Customer, CustomerStatistics, CustomerUpdate, NewCar, NewCustomer, Page,
};
use uuid::Uuid;

#[derive(Default)]
pub struct CustomerQuery;

#[Object]
impl CustomerQuery {
    /// Ordered by last name, then first name
    async fn customers(
        &self,
        ctx: &Context<'_>,
        search: Option<String>,
        skip: Option<i64>,
        take: Option<i64>,
    ) -> Result<Vec<Customer>> {
        let search = search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        store(ctx)?
            .list_customers(tenant(ctx)?, search, Page::new(skip, take))
            .await
            .extend()
    }

    async fn customer_by_id(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Customer>> {
        store(ctx)?.get_customer(tenant(ctx)?, id).await.extend()
    }

    async fn cars(&self, ctx: &Context<'_>, customer_id: Option<Uuid>) -> Result<Vec<Car>> {
        store(ctx)?
            .list_cars(tenant(ctx)?, customer_id)
            .await
            .extend()
    }

    async fn car_by_id(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Car>> {
        store(ctx)?.get_car(tenant(ctx)?, id).await.extend()
    }

    async fn customer_statistics(&self, ctx: &Context<'_>) -> Result<CustomerStatistics> {
        store(ctx)?
            .customer_statistics(tenant(ctx)?, Utc::now())
            .await
            .extend()
    }

    /// Base64-encoded CSV of every customer
    async fn export_customers_to_csv(&self, ctx: &Context<'_>) -> Result<String> {
        let rows = store(ctx)?
            .customer_export_rows(tenant(ctx)?)
            .await
            .extend()?;
        Ok(customers_csv_base64(&rows))
    }
}

#[derive(Default)]
pub struct CustomerMutation;

#[Object]
impl CustomerMutation {
    async fn create_customer(&self, ctx: &Context<'_>, input: NewCustomer) -> Result<Customer> {
        store(ctx)?
            .create_customer(tenant(ctx)?, input)
            .await
            .extend()
    }

    async fn update_customer(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        input: CustomerUpdate,
    ) -> Result<Customer> {
        store(ctx)?
            .update_customer(tenant(ctx)?, id, input)
            .await
            .extend()
    }

    async fn create_car(&self, ctx: &Context<'_>, input: NewCar) -> Result<Car> {
        store(ctx)?.create_car(tenant(ctx)?, input).await.extend()
    }

    async fn update_car(&self, ctx: &Context<'_>, id: Uuid, input: CarUpdate) -> Result<Car> {
        store(ctx)?
            .update_car(tenant(ctx)?, id, input)
            .await
            .extend()
    }
}
