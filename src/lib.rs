//! Privacy-preserving decision-tree induction (ID3) over data horizontally
//! partitioned across mutually distrusting parties.
//!
//! No party learns another party's per-class record counts; only the
//! aggregate statistics needed to pick the best splitting attribute are ever
//! revealed, and only to the querying party. The protocol stack is built on
//! the additively homomorphic Paillier cryptosystem and provides
//! honest-but-curious security.
//!
//! ## Main Components
//!
//! The crate is structured into several modules, leaves first:
//!
//! * [`paillier`]: The Paillier key pair with its homomorphic encryption
//!   primitives.
//! * [`computation`]: The generic two-role secret-sharing engine for secure
//!   addition and multiplication.
//! * [`division`]: The square-division protocol computing the Gini-impurity
//!   ratio `Z / W` of one candidate split without revealing any operand.
//! * [`controller`]: Message-driven orchestration pipelining many concurrent
//!   square-division computations, exposing results as futures.
//! * [`tree`]: The recursive ID3 builder consuming those futures.
//! * [`messages`] and [`transport`]: The wire types and an in-process,
//!   bincode-framed link between the two parties.
//! * [`data`]: The [`data::DataLayer`] trait giving the protocol access to a
//!   party's local rows.
//!
//! ## Basic Usage
//!
//! Each of the two parties holds its own rows of the same schema. The
//! initiator party drives the induction:
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use secure_id3::{
//!     controller::{InitiatorController, TerminalController},
//!     data::MemoryDataLayer,
//!     paillier::KeyPair,
//!     transport::LocalLink,
//!     tree::{Attribute, SecureId3},
//! };
//!
//! # async fn example(rows_1: Vec<secure_id3::data::Row>, rows_2: Vec<secure_id3::data::Row>) {
//! let class = Attribute::new("play", ["yes", "no"]);
//! let keys = Arc::new(KeyPair::generate(512));
//!
//! let link = LocalLink::new();
//! let initiator = Arc::new(InitiatorController::new(
//!     Arc::new(MemoryDataLayer::new(rows_1, class.clone())),
//!     link.initiator_sender(),
//!     keys.clone(),
//! ));
//! let terminal = Arc::new(TerminalController::new(
//!     Arc::new(MemoryDataLayer::new(rows_2, class)),
//!     link.terminal_receiver(),
//!     keys.public_key().clone(),
//! ));
//! link.start(initiator.clone(), terminal);
//!
//! let attributes = vec![
//!     Attribute::new("outlook", ["sunny", "overcast", "rain"]),
//!     Attribute::new("wind", ["weak", "strong"]),
//! ];
//! let tree = SecureId3::new(initiator).run(&attributes, Vec::new()).await.unwrap();
//! println!("{tree}");
//! # }
//! ```
//!
//! ## Security Properties
//!
//! Every value in transit is either a Paillier ciphertext or a uniformly
//! random output share; reconstructing a result requires the shares of all
//! parties. The protocol assumes honest-but-curious parties, a reliable
//! in-order transport per computation, and exactly one terminal hop. A known
//! limitation inherited from the protocol design: the class value attributed
//! to a leaf is resolved as the last nonzero observation across parties,
//! which is not well-defined for more than two parties or for ties.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod computation;
pub mod controller;
pub mod data;
pub mod division;
pub mod messages;
pub mod paillier;
pub mod transport;
pub mod tree;
