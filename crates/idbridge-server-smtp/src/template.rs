// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use idbridge_common_secret::SecretString;

#[derive(Debug)]
pub struct RenderedEmail {
	pub subject: String,
	pub text: String,
	pub html: String,
}

const SUBJECT: &str = "Your account has moved to a new sign-in service";

pub fn temporary_password_email(
	username: &str,
	password: &SecretString,
	sign_in_url: Option<&str>,
) -> RenderedEmail {
	let password = password.expose();
	let sign_in_line = sign_in_url
		.map(|url| format!("Sign in at {url}\n\n"))
		.unwrap_or_default();

	let text = format!(
		"Hello {username},\n\n\
		Your account has been moved to our new sign-in service.\n\n\
		Temporary password: {password}\n\n\
		{sign_in_line}\
		You will be asked to choose a new password the first time you sign in.\n"
	);

	let sign_in_html = sign_in_url
		.map(|url| {
			let url = escape_html(url);
			format!("<p><a href=\"{url}\">Sign in</a></p>")
		})
		.unwrap_or_default();
	let html = format!(
		"<p>Hello {},</p>\
		<p>Your account has been moved to our new sign-in service.</p>\
		<p>Temporary password: <code>{}</code></p>\
		{sign_in_html}\
		<p>You will be asked to choose a new password the first time you sign in.</p>",
		escape_html(username),
		escape_html(password),
	);

	RenderedEmail {
		subject: SUBJECT.to_string(),
		text,
		html,
	}
}

fn escape_html(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(c),
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn both_bodies_carry_the_password() {
		let email = temporary_password_email(
			"alice",
			&SecretString::from("Ab1!cd2@Ef3#gh4$"),
			Some("https://login.example.com"),
		);
		assert!(email.text.contains("Ab1!cd2@Ef3#gh4$"));
		assert!(email.text.contains("https://login.example.com"));
		assert!(email.html.contains("<code>Ab1!cd2@Ef3#gh4$</code>"));
	}

	#[test]
	fn html_body_escapes_user_input() {
		let email = temporary_password_email("<b>eve</b>", &SecretString::from("a&b<c>Dd1!"), None);
		assert!(email.html.contains("&lt;b&gt;eve&lt;/b&gt;"));
		assert!(email.html.contains("a&amp;b&lt;c&gt;Dd1!"));
		assert!(!email.html.contains("<a href"));
	}
}
