// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory [`IdentityStore`] for tests in this and dependent crates.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use idbridge_common_secret::SecretString;

use crate::schema::{ExtensionAttr, ExtensionSchema};
use crate::types::{RemoteAttributes, UserDraft};
use crate::{IdentityError, IdentityStore};

#[derive(Debug, Clone)]
pub struct StoredIdentity {
	pub id: String,
	pub email: String,
	pub username: String,
	pub password: String,
	pub force_change: bool,
	pub account_enabled: bool,
	pub extensions: BTreeMap<ExtensionAttr, String>,
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
	identities: Mutex<HashMap<String, StoredIdentity>>,
	unavailable: AtomicBool,
	failing_emails: Mutex<HashSet<String>>,
	create_delay: Mutex<Option<Duration>>,
	lose_create_responses: AtomicBool,
	create_calls: AtomicUsize,
	created_at: Mutex<Vec<(String, tokio::time::Instant)>>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
	next_id: AtomicUsize,
}

impl InMemoryIdentityStore {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Every call fails with `Unavailable` while set.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	/// `create` fails with `Unavailable` for this email.
	pub fn fail_creates_for(&self, email: &str) {
		self.failing_emails
			.lock()
			.unwrap()
			.insert(email.to_lowercase());
	}

	/// `create` sleeps before completing, to expose concurrency.
	pub fn set_create_delay(&self, delay: Duration) {
		*self.create_delay.lock().unwrap() = Some(delay);
	}

	/// `create` commits the identity but then reports a timeout, like a
	/// response lost on the way back.
	pub fn set_lose_create_responses(&self, lose: bool) {
		self.lose_create_responses.store(lose, Ordering::SeqCst);
	}

	/// Register an identity as if it had been created out of band.
	pub fn insert(&self, email: &str, username: &str) -> String {
		let id = self.allocate_id();
		self.identities.lock().unwrap().insert(
			id.clone(),
			StoredIdentity {
				id: id.clone(),
				email: email.to_lowercase(),
				username: username.to_string(),
				password: String::new(),
				force_change: false,
				account_enabled: true,
				extensions: BTreeMap::new(),
			},
		);
		id
	}

	pub fn set_extension(&self, remote_id: &str, attr: ExtensionAttr, value: &str) {
		if let Some(identity) = self.identities.lock().unwrap().get_mut(remote_id) {
			identity.extensions.insert(attr, value.to_string());
		}
	}

	pub fn get(&self, remote_id: &str) -> Option<StoredIdentity> {
		self.identities.lock().unwrap().get(remote_id).cloned()
	}

	pub fn get_by_email(&self, email: &str) -> Option<StoredIdentity> {
		let email = email.to_lowercase();
		self.identities
			.lock()
			.unwrap()
			.values()
			.find(|i| i.email == email)
			.cloned()
	}

	pub fn len(&self) -> usize {
		self.identities.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn create_calls(&self) -> usize {
		self.create_calls.load(Ordering::SeqCst)
	}

	/// Emails of successful creates with the (tokio) time each completed.
	pub fn creation_log(&self) -> Vec<(String, tokio::time::Instant)> {
		self.created_at.lock().unwrap().clone()
	}

	/// Highest number of `create` calls observed running at once.
	pub fn max_concurrent_creates(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}

	fn allocate_id(&self) -> String {
		format!("remote-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
	}

	fn check_available(&self) -> Result<(), IdentityError> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(IdentityError::unavailable("identity provider offline"));
		}
		Ok(())
	}
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
	async fn find_by_email(&self, email: &str) -> Result<Option<String>, IdentityError> {
		self.check_available()?;
		Ok(self.get_by_email(email).map(|i| i.id))
	}

	async fn create(
		&self,
		draft: &UserDraft,
		initial_password: &SecretString,
		force_change: bool,
	) -> Result<String, IdentityError> {
		self.create_calls.fetch_add(1, Ordering::SeqCst);
		let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(running, Ordering::SeqCst);

		let delay = *self.create_delay.lock().unwrap();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		let result = self.create_now(draft, initial_password, force_change);

		self.in_flight.fetch_sub(1, Ordering::SeqCst);
		if result.is_ok() && self.lose_create_responses.load(Ordering::SeqCst) {
			return Err(IdentityError::unavailable("request timed out"));
		}
		result
	}

	async fn patch_password(
		&self,
		remote_id: &str,
		password: &SecretString,
	) -> Result<(), IdentityError> {
		self.check_available()?;
		let mut identities = self.identities.lock().unwrap();
		let identity = identities
			.get_mut(remote_id)
			.ok_or_else(|| IdentityError::NotFound(remote_id.to_string()))?;
		identity.password = password.expose().clone();
		identity.force_change = false;
		Ok(())
	}

	async fn fetch_attributes(&self, remote_id: &str) -> Result<RemoteAttributes, IdentityError> {
		self.check_available()?;
		let identity = self
			.get(remote_id)
			.ok_or_else(|| IdentityError::NotFound(remote_id.to_string()))?;
		Ok(RemoteAttributes {
			id: identity.id,
			display_name: Some(identity.username),
			mail: Some(identity.email),
			account_enabled: Some(identity.account_enabled),
			extensions: identity.extensions,
		})
	}

	async fn extension_schema(&self) -> Arc<ExtensionSchema> {
		Arc::new(ExtensionSchema::builtin(Some("test")))
	}

	async fn health(&self) -> Result<(), IdentityError> {
		self.check_available()
	}
}

impl InMemoryIdentityStore {
	fn create_now(
		&self,
		draft: &UserDraft,
		initial_password: &SecretString,
		force_change: bool,
	) -> Result<String, IdentityError> {
		self.check_available()?;
		let email = draft.email.to_lowercase();
		if self.failing_emails.lock().unwrap().contains(&email) {
			return Err(IdentityError::unavailable(format!("injected failure for {email}")));
		}
		if self.get_by_email(&email).is_some() {
			return Err(IdentityError::Conflict(format!("{email} already exists")));
		}

		let id = self.allocate_id();
		self.identities.lock().unwrap().insert(
			id.clone(),
			StoredIdentity {
				id: id.clone(),
				email,
				username: draft.username.clone(),
				password: initial_password.expose().clone(),
				force_change,
				account_enabled: draft.account_enabled,
				extensions: BTreeMap::new(),
			},
		);
		self.created_at
			.lock()
			.unwrap()
			.push((draft.email.to_lowercase(), tokio::time::Instant::now()));
		Ok(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn duplicate_email_conflicts() {
		let store = InMemoryIdentityStore::new();
		let draft = UserDraft::new("a@example.com", "a");
		let password = SecretString::from("Abcdef#123456789");
		store.create(&draft, &password, true).await.unwrap();
		assert!(matches!(
			store.create(&draft, &password, true).await,
			Err(IdentityError::Conflict(_))
		));
		assert!(store.exists("A@example.com").await.unwrap());
	}

	#[tokio::test]
	async fn offline_store_is_unavailable() {
		let store = InMemoryIdentityStore::new();
		store.set_unavailable(true);
		assert!(matches!(
			store.health().await,
			Err(IdentityError::Unavailable { .. })
		));
	}
}
