pub mod readings;

pub use readings::DynamoReadingStore;
