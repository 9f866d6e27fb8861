//! Filing feed collaborators.
//!
//! Two adapters behind the `FilingFeed` seam: a Finnhub HTTP client for
//! live insider-transaction data and a JSON file feed for simulation and
//! testing. Swapping feeds requires no engine change.

mod file;
mod finnhub;
mod reference;

pub use file::{FileFeed, RawFiling};
pub use finnhub::FinnhubFeed;
pub use reference::StaticReferenceSource;
