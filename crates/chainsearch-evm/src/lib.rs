//! chainsearch-evm — EVM JSON-RPC chain source and processor builder.

pub mod builder;
pub mod fetcher;

pub use builder::ProcessorBuilder;
pub use fetcher::{EvmChainSource, EvmRpcClient, RawLog, RawTransaction};
