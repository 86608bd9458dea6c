//! Client for the nonprofit's REST API: auth, volunteers, donations,
//! contact, impact, stories and about pages.

mod client;
pub mod types;

pub use client::NonprofitApi;

/// Cacheable read endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
  Volunteers,
  Donations,
  Impact,
  Stories,
  About { section: String },
}

impl Resource {
  /// Key the resource is cached under.
  pub fn cache_key(&self) -> String {
    match self {
      Self::Volunteers => "volunteers".to_string(),
      Self::Donations => "donations".to_string(),
      Self::Impact => "impact".to_string(),
      Self::Stories => "stories".to_string(),
      Self::About { section } => format!("about:{}", normalize_section(section)),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::Volunteers => "volunteers".to_string(),
      Self::Donations => "donations".to_string(),
      Self::Impact => "impact statistics".to_string(),
      Self::Stories => "stories".to_string(),
      Self::About { section } => format!("about: {}", section),
    }
  }
}

/// Normalize a section name so "Team", "/team" and "team " share a key.
fn normalize_section(section: &str) -> String {
  section.trim().trim_matches('/').to_lowercase()
}
