//! Fixtures shared by the repository tests.

use chrono::{Duration as ChronoDuration, Utc};

use crate::pool::{Database, DbConfig};
use labstock_core::input::{DetailInput, NewAcademicPeriod, NewComponent, NewRequest};
use labstock_core::{AcademicPeriod, Category, Component, Request};

/// Fresh in-memory database with migrations applied.
pub(crate) async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub(crate) async fn seed_category(db: &Database, name: &str) -> Category {
    db.categories().create(name).await.unwrap()
}

pub(crate) async fn seed_period(db: &Database, name: &str, active: bool) -> AcademicPeriod {
    let start = Utc::now() - ChronoDuration::days(30);
    let period = db
        .periods()
        .create(&NewAcademicPeriod {
            name: name.to_string(),
            start_date: start,
            end_date: start + ChronoDuration::days(120),
        })
        .await
        .unwrap();

    if active {
        db.periods().set_active(period.id).await.unwrap()
    } else {
        period
    }
}

/// Component with `quantity` units of initial stock in the active period.
pub(crate) async fn seed_component(
    db: &Database,
    category_id: i64,
    name: &str,
    quantity: i64,
) -> Component {
    db.components()
        .create_with_stock(&NewComponent {
            name: name.to_string(),
            description: None,
            initial_quantity: quantity,
            category_id,
            reason: "Initial stock".to_string(),
            image_url: None,
            academic_period_id: None,
        })
        .await
        .unwrap()
}

pub(crate) fn new_request(user_id: i64, lines: &[(i64, i64)]) -> NewRequest {
    NewRequest {
        user_id,
        type_request: "Laboratory practice".to_string(),
        details: lines
            .iter()
            .map(|&(component_id, quantity)| DetailInput {
                component_id,
                quantity,
            })
            .collect(),
        description: None,
        return_date: Some(Utc::now() + ChronoDuration::days(7)),
        responsible: None,
        file_url: None,
    }
}

pub(crate) async fn seed_request(db: &Database, user_id: i64, lines: &[(i64, i64)]) -> Request {
    db.requests()
        .create(&new_request(user_id, lines))
        .await
        .unwrap()
}

/// Created and accepted: status `prestamo` with open loans.
pub(crate) async fn accepted_request(
    db: &Database,
    user_id: i64,
    lines: &[(i64, i64)],
) -> Request {
    let request = seed_request(db, user_id, lines).await;
    db.requests().accept(request.request_id).await.unwrap()
}
