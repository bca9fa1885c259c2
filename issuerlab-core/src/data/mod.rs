//! Document sources and extraction

pub mod extract;
pub mod fixture;
pub mod http;
pub mod provider;
pub mod selectors;

pub use extract::{Document, ExtractError, ListingLink, StructuralQuery};
pub use fixture::{FixtureError, FixtureFetcher};
pub use http::HttpFetcher;
pub use provider::{DocumentFetcher, FetchError, FetchedDocument};
pub use selectors::{SelectorConfig, SelectorError};
