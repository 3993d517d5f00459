//! HTTP handlers
//!
//! - [`view`] - endpoints for choosing the mobile or standard view explicitly

pub mod view;

pub use view::{
    choose_mobile, choose_standard, clear_view, view_router, view_status, ViewStatus,
};
