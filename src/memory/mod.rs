pub mod fragment;
pub mod fragment_store;
pub mod global_layout;
pub mod known_region;
