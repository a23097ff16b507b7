//! Catalogue and order statistics.

use crate::{
    core::calculator::round_currency,
    entities::{
        service::{self, Platform},
        service_order::{self, OrderStatus},
    },
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary of the service catalogue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    /// Services in the catalogue, active or not
    pub total_services: usize,
    /// Services currently offered
    pub active_services: usize,
    /// Mean profit margin across all services, in percent
    pub average_margin: f64,
    /// Service count per platform
    pub by_platform: BTreeMap<Platform, usize>,
}

/// Summary of placed orders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    /// Orders of any status
    pub total_orders: usize,
    /// Order count per status
    pub by_status: BTreeMap<OrderStatus, usize>,
    /// Charged on completed and partial orders
    pub revenue: f64,
    /// Margin on completed and partial orders
    pub profit: f64,
}

/// Summarizes `services`: counts, active services, mean margin and per-platform totals.
#[must_use]
pub fn service_stats(services: &[service::Model]) -> ServiceStats {
    let mut by_platform = BTreeMap::new();
    for service in services {
        *by_platform.entry(service.platform).or_insert(0) += 1;
    }

    // Cast safety: catalogue sizes stay far below 2^52
    #[allow(clippy::cast_precision_loss)]
    let average_margin = if services.is_empty() {
        0.0
    } else {
        let total: f64 = services.iter().map(|s| s.profit_margin).sum();
        round_currency(total / services.len() as f64)
    };

    ServiceStats {
        total_services: services.len(),
        active_services: services.iter().filter(|s| s.is_active).count(),
        average_margin,
        by_platform,
    }
}

/// Summarizes `orders`. Revenue and profit only count completed and partial orders.
#[must_use]
pub fn order_stats(orders: &[service_order::Model]) -> OrderStats {
    let mut by_status = BTreeMap::new();
    let mut revenue = 0.0;
    let mut profit = 0.0;

    for order in orders {
        *by_status.entry(order.status).or_insert(0) += 1;
        if matches!(order.status, OrderStatus::Completed | OrderStatus::Partial) {
            revenue += order.final_price;
            profit += order.profit;
        }
    }

    OrderStats {
        total_orders: orders.len(),
        by_status,
        revenue: round_currency(revenue),
        profit: round_currency(profit),
    }
}
