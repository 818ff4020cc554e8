pub mod loader;
pub mod types;

pub use loader::{DataLoader, LoaderError};
pub use types::{
    FeatureMatrix, FeatureSet, PriceRow, PriceTable, Side, Trade, SHARES_PER_CONTRACT,
};
