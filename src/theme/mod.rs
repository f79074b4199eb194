//! Page rendering
//!
//! HTML pages are Tera templates compiled into the binary. Every page
//! extends `base.html`, which expects the standard variables (site name,
//! current user, pending flash messages).

use anyhow::Result;
use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera};

use crate::models::User;

mod error;

pub use error::ThemeError;

/// Site name shown in titles and the header
pub const SITE_NAME: &str = "Backdrop";

/// Page templates
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct Templates;

/// Template engine holding the compiled page templates
pub struct ThemeEngine {
    tera: Tera,
}

impl ThemeEngine {
    /// Compile the embedded templates.
    pub fn new() -> Result<Self> {
        let mut templates: Vec<(String, String)> = Vec::new();
        for name in Templates::iter() {
            let Some(file) = Templates::get(&name) else {
                continue;
            };
            let content = String::from_utf8(file.data.into_owned())
                .map_err(|_| ThemeError::InvalidEncoding(name.to_string()))?;
            templates.push((name.to_string(), content));
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| ThemeError::TemplateError(error_chain(&e)))?;

        tracing::debug!(
            count = tera.get_template_names().count(),
            "Loaded page templates"
        );
        Ok(Self { tera })
    }

    /// Render a template with context
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            ThemeError::TemplateError(format!(
                "Failed to render '{}': {}",
                template,
                error_chain(&e)
            ))
            .into()
        })
    }

    /// Render a page with the standard variables added to `context`.
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> Result<String> {
        let mut full_context = context.clone();
        full_context.insert("site_name", &standard_vars.site_name);
        full_context.insert("current_user", &standard_vars.current_user);
        full_context.insert("flashes", &standard_vars.flashes);
        full_context.insert("year", &standard_vars.year);

        self.render(template, &full_context)
    }

    /// Render a template, falling back to `error.html` and then to a bare
    /// HTML page. Never fails.
    pub fn render_with_fallback(
        &self,
        template: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> String {
        match self.render_page(template, context, standard_vars) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("{:#}", e);
                self.error_page("Something went wrong.", standard_vars)
            }
        }
    }

    /// The generic error page with `message`
    pub fn error_page(&self, message: &str, standard_vars: &StandardTemplateVars) -> String {
        let mut context = TeraContext::new();
        context.insert("error_message", message);

        match self.render_page("error.html", &context, standard_vars) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to render error page: {:#}", e);
                simple_error_page(message)
            }
        }
    }
}

fn error_chain(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

/// Last resort when even `error.html` cannot be rendered
fn simple_error_page(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"UTF-8\"><title>Error</title></head>\
         <body><h1>Error</h1><p>{}</p></body></html>",
        escaped
    )
}

/// Variables every page receives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardTemplateVars {
    pub site_name: String,
    /// Logged-in user, if any
    pub current_user: Option<CurrentUser>,
    /// Flash messages to show once
    pub flashes: Vec<String>,
    /// Current year (for the footer)
    pub year: i32,
}

/// What templates know about the logged-in user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub profile_image_id: Option<i64>,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
            profile_image_id: user.profile_image_id,
        }
    }
}

impl StandardTemplateVars {
    pub fn new(current_user: Option<&User>, flashes: Vec<String>) -> Self {
        Self {
            site_name: SITE_NAME.to_string(),
            current_user: current_user.map(CurrentUser::from),
            flashes,
            year: chrono::Utc::now().year(),
        }
    }
}
