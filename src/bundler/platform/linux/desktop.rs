//! freedesktop.org desktop entries and D-Bus service files.

use crate::bundler::{BundlerContext, Error, Result};
use handlebars::Handlebars;
use serde::Serialize;

const DESKTOP_TEMPLATE: &str = "[Desktop Entry]
Type=Application
Version=1.0
Name={{name}}
{{#if comment}}Comment={{comment}}
{{/if}}Exec={{exec}}
Icon={{icon}}
Terminal=false
Categories={{categories}}
{{#if mime_types}}MimeType={{mime_types}}
{{/if}}{{#if dbus_activatable}}DBusActivatable=true
{{/if}}";

const DBUS_SERVICE_TEMPLATE: &str = "[D-BUS Service]
Name={{name}}
Exec={{exec}}
";

/// Values of one `[Desktop Entry]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DesktopEntry {
    pub name: String,
    pub comment: Option<String>,
    pub exec: String,
    pub icon: String,
    /// `;`-terminated category list.
    pub categories: String,
    /// `;`-terminated `x-scheme-handler/...` list, empty without URL schemes.
    pub mime_types: String,
    pub dbus_activatable: bool,
}

impl DesktopEntry {
    /// Entry launching `exec` for the app of `ctx`.
    pub fn for_app(ctx: &BundlerContext, description: Option<&str>, exec: &str) -> Self {
        let app = &ctx.app;
        let exec = if app.url_schemes.is_empty() {
            exec.to_string()
        } else {
            format!("{exec} %u")
        };

        Self {
            name: ctx.app_name.clone(),
            comment: description.filter(|d| !d.is_empty()).map(String::from),
            exec,
            // Icons are installed under the identifier, see `LinuxLayout`.
            icon: app.identifier.clone(),
            categories: format!("{};", freedesktop_category(app.category.as_deref())),
            mime_types: app
                .url_schemes
                .iter()
                .map(|scheme| format!("x-scheme-handler/{scheme};"))
                .collect(),
            dbus_activatable: app.dbus_activatable,
        }
    }

    /// Renders the `.desktop` file.
    pub fn render(&self) -> Result<String> {
        render(DESKTOP_TEMPLATE, self)
    }
}

/// Renders the D-Bus session service activating `identifier` via `exec`.
pub fn dbus_service(identifier: &str, exec: &str) -> Result<String> {
    #[derive(Serialize)]
    struct Service<'a> {
        name: &'a str,
        exec: &'a str,
    }
    render(
        DBUS_SERVICE_TEMPLATE,
        &Service {
            name: identifier,
            exec,
        },
    )
}

fn render<T: Serialize>(template: &str, data: &T) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .render_template(template, data)
        .map_err(|e| Error::GenericError(format!("failed to render desktop template: {e}")))
}

/// Maps an App Store category to a freedesktop main category.
///
/// Values that are not `public.app-category.*` are taken as freedesktop
/// categories already.
pub fn freedesktop_category(category: Option<&str>) -> &str {
    let Some(category) = category else {
        return "Utility";
    };
    let Some(apple) = category.strip_prefix("public.app-category.") else {
        return category;
    };

    match apple {
        "developer-tools" => "Development",
        "education" => "Education",
        "graphics-design" | "photography" => "Graphics",
        "music" | "video" | "entertainment" => "AudioVideo",
        "business" | "finance" | "productivity" | "reference" => "Office",
        "social-networking" | "news" => "Network",
        "medical" | "healthcare-fitness" => "Science",
        games if games == "games" || games.ends_with("-games") => "Game",
        _ => "Utility",
    }
}
