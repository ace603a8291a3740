// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds for the gateway.
///
/// Startup-time kinds are fatal (the process exits with a diagnostic);
/// everything else stays local to the request, connection, or operation
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayError {
    ConfigMissing,
    ConfigInvalid,
    WorkerSpawnFailed,
    WorkerCrashLoop,
    IpcBindFailed,
    IpcDecodeError,
    BrokerConnectFailed,
    UpgradeRejected,
    AuthInvalid,
    RouteMissing,
    UpstreamUnavailable,
    UpstreamTimeout,
    OperationInvalid,
    OperationUnknown,
}

impl GatewayError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UpgradeRejected => 400,
            Self::AuthInvalid => 401,
            Self::RouteMissing | Self::UpstreamUnavailable => 502,
            Self::UpstreamTimeout => 504,
            Self::OperationInvalid | Self::OperationUnknown => 400,
            Self::ConfigMissing
            | Self::ConfigInvalid
            | Self::WorkerSpawnFailed
            | Self::WorkerCrashLoop
            | Self::IpcBindFailed
            | Self::IpcDecodeError
            | Self::BrokerConnectFailed => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "CONFIG_MISSING",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::WorkerSpawnFailed => "WORKER_SPAWN_FAILED",
            Self::WorkerCrashLoop => "WORKER_CRASH_LOOP",
            Self::IpcBindFailed => "IPC_BIND_FAILED",
            Self::IpcDecodeError => "IPC_DECODE_ERROR",
            Self::BrokerConnectFailed => "BROKER_CONNECT_FAILED",
            Self::UpgradeRejected => "UPGRADE_REJECTED",
            Self::AuthInvalid => "AUTH_INVALID",
            Self::RouteMissing => "ROUTE_MISSING",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            Self::OperationInvalid => "OPERATION_INVALID",
            Self::OperationUnknown => "OPERATION_UNKNOWN",
        }
    }

    /// Build the JSON error response every proxy and upgrade failure carries.
    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorMessage>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorMessage { message: message.into() }))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of every user-visible failure response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}
