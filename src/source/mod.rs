//! Loading activities and reference catalogs from disk.

pub mod activities;
pub mod catalog;

pub use activities::{load_activities, ActivitySelection};
pub use catalog::{load_eio_catalog, load_process_catalog, load_reference_catalog};
