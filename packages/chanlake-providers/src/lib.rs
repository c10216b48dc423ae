pub mod detector;
pub mod scrape;
pub mod transform;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(
	api_key: Option<&str>,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if let Some(api_key) = api_key {
		headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Replaces every `{name}` placeholder in each argument.
pub(crate) fn substitute(args: &[String], vars: &[(&str, &str)]) -> Vec<String> {
	args.iter()
		.map(|arg| {
			vars.iter().fold(arg.clone(), |acc, (name, value)| {
				acc.replace(&format!("{{{name}}}"), value)
			})
		})
		.collect()
}

/// Keeps log fields bounded when a subprocess is chatty.
pub(crate) fn truncate_output(text: &str, max_chars: usize) -> String {
	if text.chars().count() <= max_chars {
		return text.to_string();
	}

	let mut out: String = text.chars().take(max_chars).collect();

	out.push_str("...");

	out
}
