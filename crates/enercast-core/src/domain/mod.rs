//! # Domain Models
//!
//! Validated value types shared by every engine component.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated commodity symbol |
//! | [`TradeDate`] | Calendar date, ISO formatted |
//! | [`Frequency`] | Native series frequency (daily, weekly) |
//! | [`PricePoint`] / [`PriceSeries`] | Gap-annotated price history |
//! | [`ModelArtifact`] | Immutable trained-model record |
//! | [`ArtifactId`] | (commodity, family, version) arena key |

mod artifact;
mod date;
mod frequency;
mod series;
mod symbol;

pub use artifact::{ArtifactId, ArtifactVersion, ModelArtifact, ModelFamily, ModelVersion};
pub use date::TradeDate;
pub use frequency::Frequency;
pub use series::{period_dates, Commodity, PricePoint, PriceSeries};
pub use symbol::Symbol;
