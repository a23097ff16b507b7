//! Service catalogue business logic - resold services and the orders placed against them.
//!
//! A service's `final_price` is always derived from its provider price and margin. Orders
//! copy the unit price and profit at creation time, so re-pricing a service never changes
//! an order that already exists.

use crate::{
    core::calculator::{calculate_final_price, calculate_profit, round_currency},
    entities::{
        Service, ServiceOrder,
        service::{self, Platform, ServiceType},
        service_order::{self, OrderStatus},
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;
use tracing::{info, instrument};

const fn default_min_quantity() -> i64 {
    1
}

const fn default_max_quantity() -> i64 {
    10_000
}

const fn default_active() -> bool {
    true
}

/// Input for creating a service. Deserializable so the settings file can seed services.
#[derive(Debug, Clone, Deserialize)]
pub struct NewService {
    /// Display name
    pub name: String,
    /// Platform the service targets
    pub platform: Platform,
    /// Kind of engagement delivered
    pub service_type: ServiceType,
    /// Upstream cost per unit
    pub provider_price: f64,
    /// Markup in percent
    pub profit_margin: f64,
    /// Smallest orderable quantity
    #[serde(default = "default_min_quantity")]
    pub min_quantity: i64,
    /// Largest orderable quantity
    #[serde(default = "default_max_quantity")]
    pub max_quantity: i64,
    /// Whether the service can be ordered right away
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Creates a service, deriving its final price from the provider price and margin.
///
/// # Errors
/// Returns an error if:
/// - The name is empty or whitespace-only
/// - The provider price or margin is negative or not finite
/// - `min_quantity` is below 1 or above `max_quantity`
/// - The database insert fails
pub async fn create_service(db: &DatabaseConnection, new: NewService) -> Result<service::Model> {
    if new.name.trim().is_empty() {
        return Err(Error::InvalidInput {
            message: "Service name cannot be empty".to_string(),
        });
    }
    if new.min_quantity < 1 || new.max_quantity < new.min_quantity {
        return Err(Error::InvalidInput {
            message: format!(
                "Invalid quantity range {}..={}",
                new.min_quantity, new.max_quantity
            ),
        });
    }
    let final_price = calculate_final_price(new.provider_price, new.profit_margin)?;

    let now = Utc::now();
    let service = service::ActiveModel {
        name: Set(new.name.trim().to_string()),
        platform: Set(new.platform),
        service_type: Set(new.service_type),
        provider_price: Set(new.provider_price),
        profit_margin: Set(new.profit_margin),
        final_price: Set(final_price),
        min_quantity: Set(new.min_quantity),
        max_quantity: Set(new.max_quantity),
        is_active: Set(new.is_active),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(id = service.id, name = %service.name, final_price, "Created service");
    Ok(service)
}

/// Creates every service from `services` whose name is not taken yet.
///
/// # Errors
/// Returns an error if a service is invalid or a database operation fails.
pub async fn seed_services(db: &DatabaseConnection, services: &[NewService]) -> Result<usize> {
    let mut created = 0;
    for new in services {
        let exists = Service::find()
            .filter(service::Column::Name.eq(new.name.trim()))
            .one(db)
            .await?
            .is_some();
        if !exists {
            create_service(db, new.clone()).await?;
            created += 1;
        }
    }
    Ok(created)
}

/// Retrieves a service by its ID.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn get_service_by_id(
    db: &DatabaseConnection,
    service_id: i64,
) -> Result<Option<service::Model>> {
    Service::find_by_id(service_id)
        .one(db)
        .await
        .map_err(Into::into)
}

async fn require_service(db: &DatabaseConnection, service_id: i64) -> Result<service::Model> {
    get_service_by_id(db, service_id)
        .await?
        .ok_or(Error::ServiceNotFound { id: service_id })
}

/// Lists active services ordered by name, optionally restricted to one platform.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn list_active_services(
    db: &DatabaseConnection,
    platform: Option<Platform>,
) -> Result<Vec<service::Model>> {
    let mut query = Service::find().filter(service::Column::IsActive.eq(true));
    if let Some(platform) = platform {
        query = query.filter(service::Column::Platform.eq(platform));
    }
    query
        .order_by_asc(service::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists every service, active or not, in creation order.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn list_services(db: &DatabaseConnection) -> Result<Vec<service::Model>> {
    Service::find()
        .order_by_asc(service::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Changes a service's provider price and margin and recomputes its final price.
///
/// Existing orders keep the price they were placed at.
///
/// # Errors
/// Returns an error if the price or margin is invalid, the service does not exist,
/// or the update fails.
#[instrument(skip(db))]
pub async fn update_service_pricing(
    db: &DatabaseConnection,
    service_id: i64,
    provider_price: f64,
    profit_margin: f64,
) -> Result<service::Model> {
    let final_price = calculate_final_price(provider_price, profit_margin)?;

    let mut service: service::ActiveModel = require_service(db, service_id).await?.into();
    service.provider_price = Set(provider_price);
    service.profit_margin = Set(profit_margin);
    service.final_price = Set(final_price);
    service.updated_at = Set(Utc::now());

    service.update(db).await.map_err(Into::into)
}

/// Enables or disables ordering of a service.
///
/// # Errors
/// Returns an error if the service does not exist or the update fails.
pub async fn set_service_active(
    db: &DatabaseConnection,
    service_id: i64,
    active: bool,
) -> Result<service::Model> {
    let mut service: service::ActiveModel = require_service(db, service_id).await?.into();
    service.is_active = Set(active);
    service.updated_at = Set(Utc::now());
    service.update(db).await.map_err(Into::into)
}

/// Places an order, freezing its price and profit from the service's current pricing.
///
/// # Errors
/// Returns an error if:
/// - The service does not exist (`ServiceNotFound`)
/// - The service is inactive, the user or link is empty, or the quantity is outside
///   the service's range (`InvalidInput`)
/// - The database insert fails
#[instrument(skip(db))]
pub async fn create_order(
    db: &DatabaseConnection,
    service_id: i64,
    user_id: &str,
    link: &str,
    quantity: i64,
) -> Result<service_order::Model> {
    let service = require_service(db, service_id).await?;

    if !service.is_active {
        return Err(Error::InvalidInput {
            message: format!("Service '{}' is not available", service.name),
        });
    }
    if user_id.trim().is_empty() || link.trim().is_empty() {
        return Err(Error::InvalidInput {
            message: "Orders need a user and a target link".to_string(),
        });
    }
    if quantity < service.min_quantity || quantity > service.max_quantity {
        return Err(Error::InvalidInput {
            message: format!(
                "Quantity {quantity} outside {}..={} for '{}'",
                service.min_quantity, service.max_quantity, service.name
            ),
        });
    }

    // Cast safety: quantities are bounded by max_quantity
    #[allow(clippy::cast_precision_loss)]
    let final_price = round_currency(service.final_price * quantity as f64);
    let profit = calculate_profit(service.provider_price, quantity, service.profit_margin)?;

    let now = Utc::now();
    let order = service_order::ActiveModel {
        service_id: Set(service.id),
        user_id: Set(user_id.trim().to_string()),
        link: Set(link.trim().to_string()),
        quantity: Set(quantity),
        final_price: Set(final_price),
        profit: Set(profit),
        status: Set(OrderStatus::Pending),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(id = order.id, final_price, profit, "Created order");
    Ok(order)
}

/// Retrieves an order by its ID.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn get_order_by_id(
    db: &DatabaseConnection,
    order_id: i64,
) -> Result<Option<service_order::Model>> {
    ServiceOrder::find_by_id(order_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Moves an order to `status` if the fulfilment flow allows it.
///
/// # Errors
/// Returns `OrderNotFound`, `InvalidStatusTransition`, or a database error.
#[instrument(skip(db))]
pub async fn update_order_status(
    db: &DatabaseConnection,
    order_id: i64,
    status: OrderStatus,
) -> Result<service_order::Model> {
    let order = get_order_by_id(db, order_id)
        .await?
        .ok_or(Error::OrderNotFound { id: order_id })?;

    if !order.status.can_transition_to(status) {
        return Err(Error::InvalidStatusTransition {
            from: order.status.to_string(),
            to: status.to_string(),
        });
    }

    let mut order: service_order::ActiveModel = order.into();
    order.status = Set(status);
    order.updated_at = Set(Utc::now());
    order.update(db).await.map_err(Into::into)
}

/// Lists a user's orders, newest first.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn list_orders_for_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<service_order::Model>> {
    ServiceOrder::find()
        .filter(service_order::Column::UserId.eq(user_id))
        .order_by_desc(service_order::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists every order in creation order.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn list_orders(db: &DatabaseConnection) -> Result<Vec<service_order::Model>> {
    ServiceOrder::find()
        .order_by_asc(service_order::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_service_derives_final_price() -> Result<()> {
        let db = setup_test_db().await?;
        let service = create_test_service(&db, "IG Followers", 10.0, 30.0).await?;

        assert_eq!(service.final_price, 13.0);
        assert_eq!(service.platform, Platform::Instagram);
        assert!(service.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_service_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let base = new_test_service("Valid", 1.0, 10.0);

        let result = create_service(
            &db,
            NewService {
                name: "   ".to_string(),
                ..base.clone()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let result = create_service(
            &db,
            NewService {
                provider_price: -1.0,
                ..base.clone()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));

        let result = create_service(
            &db,
            NewService {
                min_quantity: 500,
                max_quantity: 100,
                ..base
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        assert!(list_services(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_order_freezes_price_and_profit() -> Result<()> {
        let db = setup_test_db().await?;
        let service = create_test_service(&db, "IG Followers", 10.0, 30.0).await?;

        let order = create_order(&db, service.id, "user-1", "https://instagram.com/acme", 5).await?;
        assert_eq!(order.final_price, 65.0);
        assert_eq!(order.profit, 15.0);
        assert_eq!(order.status, OrderStatus::Pending);

        let repriced = update_service_pricing(&db, service.id, 20.0, 50.0).await?;
        assert_eq!(repriced.final_price, 30.0);

        let reloaded = get_order_by_id(&db, order.id).await?.unwrap();
        assert_eq!(reloaded.final_price, 65.0);
        assert_eq!(reloaded.profit, 15.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_order_rejects_quantity_out_of_range() -> Result<()> {
        let db = setup_test_db().await?;
        let service = create_service(
            &db,
            NewService {
                min_quantity: 100,
                max_quantity: 1_000,
                ..new_test_service("YT Views", 0.5, 40.0)
            },
        )
        .await?;

        for quantity in [0, 99, 1_001] {
            let result = create_order(&db, service.id, "user-1", "https://youtu.be/x", quantity).await;
            assert!(matches!(result, Err(Error::InvalidInput { .. })));
        }
        assert!(create_order(&db, service.id, "user-1", "https://youtu.be/x", 100).await.is_ok());
        assert!(create_order(&db, service.id, "user-1", "https://youtu.be/x", 1_000).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_service_cannot_be_ordered() -> Result<()> {
        let db = setup_test_db().await?;
        let service = create_test_service(&db, "TikTok Likes", 2.0, 25.0).await?;
        set_service_active(&db, service.id, false).await?;

        let result = create_order(&db, service.id, "user-1", "https://tiktok.com/@x", 10).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let missing = create_order(&db, 9_999, "user-1", "https://tiktok.com/@x", 10).await;
        assert!(matches!(missing, Err(Error::ServiceNotFound { id: 9_999 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_active_services_by_platform() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_service(&db, "B Instagram", 1.0, 10.0).await?;
        create_test_service(&db, "A Instagram", 1.0, 10.0).await?;
        let hidden = create_test_service(&db, "C Instagram", 1.0, 10.0).await?;
        set_service_active(&db, hidden.id, false).await?;
        create_service(
            &db,
            NewService {
                platform: Platform::Telegram,
                ..new_test_service("Telegram Members", 3.0, 20.0)
            },
        )
        .await?;

        let instagram = list_active_services(&db, Some(Platform::Instagram)).await?;
        let names: Vec<&str> = instagram.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A Instagram", "B Instagram"]);

        assert_eq!(list_active_services(&db, None).await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_order_status_flow() -> Result<()> {
        let db = setup_test_db().await?;
        let service = create_test_service(&db, "IG Likes", 1.0, 10.0).await?;
        let order = create_order(&db, service.id, "user-1", "https://instagram.com/p/1", 10).await?;

        let result = update_order_status(&db, order.id, OrderStatus::Completed).await;
        assert!(matches!(result, Err(Error::InvalidStatusTransition { .. })));

        update_order_status(&db, order.id, OrderStatus::Processing).await?;
        let done = update_order_status(&db, order.id, OrderStatus::Partial).await?;
        assert_eq!(done.status, OrderStatus::Partial);

        let result = update_order_status(&db, order.id, OrderStatus::Cancelled).await;
        assert!(matches!(result, Err(Error::InvalidStatusTransition { .. })));

        let missing = update_order_status(&db, 4_242, OrderStatus::Processing).await;
        assert!(matches!(missing, Err(Error::OrderNotFound { id: 4_242 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_orders_for_user_newest_first() -> Result<()> {
        let db = setup_test_db().await?;
        let service = create_test_service(&db, "IG Views", 0.1, 50.0).await?;
        let first = create_order(&db, service.id, "alice", "https://instagram.com/a", 10).await?;
        create_order(&db, service.id, "bob", "https://instagram.com/b", 10).await?;
        let second = create_order(&db, service.id, "alice", "https://instagram.com/a", 20).await?;

        let ids: Vec<i64> = list_orders_for_user(&db, "alice")
            .await?
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(list_orders(&db).await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_services_skips_existing_names() -> Result<()> {
        let db = setup_test_db().await?;
        let seeds = vec![
            new_test_service("IG Followers", 10.0, 30.0),
            new_test_service("IG Likes", 2.0, 40.0),
        ];
        assert_eq!(seed_services(&db, &seeds).await?, 2);
        assert_eq!(seed_services(&db, &seeds).await?, 0);
        assert_eq!(list_services(&db).await?.len(), 2);
        Ok(())
    }
}
