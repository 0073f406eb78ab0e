//! The dealership agent's tools.
//!
//! Data lives in static tables; a deployment would swap these for real
//! account and inventory lookups behind the same [`Tool`](crate::Tool) trait.

pub mod account_info;
pub mod car_brand;
pub mod place_order;
pub mod sale_cars_info;

pub use account_info::AccountInfoTool;
pub use car_brand::CarBrandTool;
pub use place_order::PlaceOrderTool;
pub use sale_cars_info::SaleCarsInfoTool;

/// Reply for a user-scoped tool called without a usable `user_id`.
pub const NO_VALID_USER: &str = "未获取到有效的用户信息";

#[cfg(test)]
pub(crate) fn test_context(user_id: Option<&str>) -> crate::tool::ToolContext {
    use showroom_core::RunMetadata;
    let metadata = user_id.map(RunMetadata::for_user).unwrap_or_default();
    crate::tool::ToolContext::new("test-thread", metadata)
}
