//! Error types for the auction engine

use league_store::{AssetKey, AuctionId, LeagueId, PlayerId, StoreError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarketError>;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Auction not found: {auction_id}")]
    AuctionNotFound { auction_id: AuctionId },

    #[error("Asset not found: {key}")]
    AssetNotFound { key: AssetKey },

    #[error("Player {player_id} is not a member of league {league_id}")]
    MembershipNotFound { league_id: LeagueId, player_id: PlayerId },

    #[error("Auction {auction_id} has not finished yet")]
    AuctionNotFinished { auction_id: AuctionId },

    #[error("Auction {auction_id} was already settled")]
    AuctionAlreadySettled { auction_id: AuctionId },

    #[error("Auction {auction_id} has no bids")]
    NoBids { auction_id: AuctionId },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Player {player_id} does not own {key}")]
    NotOwner { key: AssetKey, player_id: PlayerId },

    #[error("{key} is not listed for sale")]
    NotForSale { key: AssetKey },

    #[error("No pending league offer for {key}")]
    NoPendingOffer { key: AssetKey },

    /// Asset was taken by another player before the auction settled
    #[error("{key} is owned by player {owner}")]
    AssetUnavailable { key: AssetKey, owner: PlayerId },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse classification used by the HTTP layer to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Precondition,
    InsufficientFunds,
    Storage,
}

impl MarketError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::Validation { .. } => ErrorKind::Validation,
            MarketError::AuctionNotFound { .. }
            | MarketError::AssetNotFound { .. }
            | MarketError::MembershipNotFound { .. } => ErrorKind::NotFound,
            MarketError::AuctionNotFinished { .. }
            | MarketError::AuctionAlreadySettled { .. }
            | MarketError::NoBids { .. }
            | MarketError::NotOwner { .. }
            | MarketError::NotForSale { .. }
            | MarketError::NoPendingOffer { .. }
            | MarketError::AssetUnavailable { .. } => ErrorKind::Precondition,
            MarketError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            MarketError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            MarketError::Store(StoreError::AlreadyExists(_)) => ErrorKind::Precondition,
            MarketError::Store(_) => ErrorKind::Storage,
        }
    }
}
