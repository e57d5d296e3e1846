//! Test support: fake collaborators and row fixtures.
//!
//! Pair these with [`MemoryStore`](crate::store::MemoryStore) to run the
//! sync layer without a network.

mod fakes;
pub mod fixtures;

pub use fakes::{
    FakeDocumentRenderer, FakeInvitationSender, FakePaymentGateway, FakeTextGenerator,
};
