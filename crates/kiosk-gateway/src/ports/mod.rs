//! Ports Layer
//!
//! Driven ports (outbound) for the collaborators the gateway talks to.

pub mod outbound;

pub use outbound::{
    BottleClassifier, ClassifierError, NotifierError, StoreError, UserStore, VoucherNotifier,
};
