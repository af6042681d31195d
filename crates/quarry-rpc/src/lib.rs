// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process transports for Quarry plugins.
//!
//! Two protocol generations coexist. Call-per-query plugins ([`V1Plugin`])
//! are spawned for every request with the request as an argument. Persistent
//! plugins ([`V2Plugin`]) run one worker process that speaks JSON-RPC over a
//! framed duplex stream and may call host methods at any time. Every worker
//! is tracked by a [`ProcessSupervisor`].

pub mod bridge;
pub mod buffer;
pub mod connection;
pub mod constructor;
pub mod escape;
pub mod framing;
pub mod launch;
pub mod protocol;
pub mod supervisor;
pub mod v1;
pub mod v2;

pub use buffer::DelimitedBuffer;
pub use connection::{ConnectionOptions, RpcConnection};
pub use constructor::{PROCESS_RUNTIMES, ProcessConstructor, TransportSettings};
pub use escape::{escape_argument, unescape_argument};
pub use framing::{FrameCodec, Framing, FramingError};
pub use launch::{LaunchSettings, LaunchSpec};
pub use protocol::{QueryResponse, V1Request, WireResult};
pub use supervisor::ProcessSupervisor;
pub use v1::{V1Options, V1Plugin};
pub use v2::{V2Options, V2Plugin};
