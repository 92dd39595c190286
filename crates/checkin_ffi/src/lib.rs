//! Flutter bridge for the Check-in core.

pub mod api;
