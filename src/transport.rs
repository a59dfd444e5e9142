//! Transport selection
//!
//! Picks the host transport once at startup and runs the dispatcher on it. Each transport
//! module adapts its native request into a [`crate::context::RequestContext`] and converts
//! the [`crate::encoder::Encoded`] reply back.

use clap::ValueEnum;
use std::io;

use crate::dispatcher::Dispatcher;
use crate::transport_actix::serve_actix;
use crate::transport_fetch::{serve_fetch, FetchHandler};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// actix-web server with middleware chain
    #[default]
    Actix,
    /// hyper-hosted fetch-style handler function
    Fetch,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Actix => "actix",
            Transport::Fetch => "fetch",
        }
    }
}

/// Serve `dispatcher` on every address until shutdown.
pub async fn serve(
    transport: Transport,
    addrs: Vec<(String, u16)>,
    dispatcher: Dispatcher,
) -> io::Result<()> {
    tracing::info!(
        transport = transport.as_str(),
        routes = dispatcher.table().len(),
        "Starting gateway"
    );
    match transport {
        Transport::Actix => serve_actix(addrs, dispatcher).await,
        Transport::Fetch => {
            let mut listeners = Vec::with_capacity(addrs.len());
            for (host, port) in addrs {
                listeners.push(tokio::net::TcpListener::bind((host.as_str(), port)).await?);
            }
            serve_fetch(listeners, FetchHandler::new(dispatcher)).await
        }
    }
}
