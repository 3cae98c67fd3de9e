//! Literature source: PubMed E-utilities and PMC

pub mod client;
pub mod models;
pub mod rate_limit;
pub mod xml;

pub use client::{PubMedClient, PubMedError};
pub use models::{Article, ArticleStub, PatientContext, SearchResult};
pub use rate_limit::RateGate;
