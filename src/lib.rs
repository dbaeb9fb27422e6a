//! EDF data connector: fetches account, contract, billing and consumption
//! data from the EDF mobile gateway and the Edelia insight API, reconciles
//! it into canonical records and persists them by natural key, downloading
//! bill PDFs along the way.
//!
//! The work is organised as a strictly sequential pipeline of stages; see
//! [`pipeline`] for the execution model and [`connector`] for the wiring.

pub mod config;
pub mod connector;
pub mod dictionaries;
pub mod doc;
pub mod edelia;
pub mod errors;
pub mod filestore;
pub mod models;
pub mod pg_store;
pub mod pipeline;
pub mod stages;
pub mod store;
pub mod transport;
pub mod upsert;
pub mod xml;
