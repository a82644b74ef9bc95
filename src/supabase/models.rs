//! Rows the relay reads from the job board schema. Only the columns the
//! emails need are modelled; everything else in the row is ignored.

use serde::Deserialize;

use crate::notifications::UserRole;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Profile {
    pub fn role(&self) -> UserRole {
        UserRole::from_db(self.role.as_deref())
    }

    /// Email when present and non-blank
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CompanyRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub employer_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub job_type: Option<String>,
    /// Embedded by `select=*,companies(name)`
    #[serde(default)]
    pub companies: Option<CompanyRef>,
}

impl Job {
    pub fn company_name(&self) -> Option<&str> {
        self.companies
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Application {
    pub id: String,
    pub job_id: String,
    /// Older rows call this column `user_id`
    #[serde(alias = "user_id")]
    pub applicant_id: String,
    #[serde(default)]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub resume_url: Option<String>,
}
