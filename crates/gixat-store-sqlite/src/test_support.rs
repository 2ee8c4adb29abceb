//! Fixtures shared by the store tests

use gixat_core::OrganizationId;
use gixat_core::models::{
    Car, Customer, NewCar, NewCustomer, NewOrganization, NewUser, User, UserRole, UserType,
};
use gixat_core::store::{CustomerStore, OrganizationStore, UserStore};

use crate::SqliteGarageStore;

pub(crate) async fn store() -> SqliteGarageStore {
    SqliteGarageStore::in_memory().await.unwrap()
}

pub(crate) fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        full_name: "Test User".to_string(),
        password_hash: "$argon2id$test".to_string(),
        user_type: UserType::Organizational,
        role: UserRole::OrgUser,
        organization_id: None,
    }
}

/// An organization with one admin whose email is `admin@{tag}.test`
pub(crate) async fn tenant(store: &SqliteGarageStore, tag: &str) -> (OrganizationId, User) {
    let admin = store
        .create_user(new_user(&format!("admin@{}.test", tag)))
        .await
        .unwrap();
    let org = store
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
            Some(admin.id),
        )
        .await
        .unwrap();
    let admin = store.get_user(admin.id).await.unwrap().unwrap();
    (OrganizationId::from_uuid(org.id), admin)
}

/// A user of `org` with the given email
pub(crate) async fn member(store: &SqliteGarageStore, org: OrganizationId, email: &str) -> User {
    let mut user = new_user(email);
    user.organization_id = Some(*org.as_uuid());
    store.create_user(user).await.unwrap()
}

pub(crate) fn new_customer(phone: &str) -> NewCustomer {
    NewCustomer {
        first_name: "Lina".into(),
        last_name: "Haddad".into(),
        phone_number: phone.into(),
        ..Default::default()
    }
}

pub(crate) async fn customer_with_car(
    store: &SqliteGarageStore,
    org: OrganizationId,
    plate: &str,
) -> (Customer, Car) {
    let customer = store
        .create_customer(org, new_customer(&format!("079{}", plate)))
        .await
        .unwrap();
    let car = store
        .create_car(
            org,
            NewCar {
                customer_id: customer.id,
                make: "Toyota".into(),
                model: "Corolla".into(),
                year: 2019,
                license_plate: plate.into(),
                vin: None,
                color: Some("White".into()),
            },
        )
        .await
        .unwrap();
    (customer, car)
}
