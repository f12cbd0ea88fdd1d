// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod auth;
pub mod docs;
pub mod health;
pub mod jobs;
pub mod migration;
pub mod password;
pub mod webhook;
