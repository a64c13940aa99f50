// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("invalid environment: {0} (expected 'dev' or 'prd')")]
	InvalidEnvironment(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
