//! Token families recognized in change templates.
//!
//! Each family is a snippet shape that names a project-specific identifier.
//! Substitution replaces the identifier part and keeps the surrounding text.

use crate::identifiers::{rename_hosts, IdentifierMap};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static DATA_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<call>AddDbContext|AddDbContextFactory|AddDbContextPool)\s*<\s*(?P<ty>[A-Za-z_@][\w.]*)\s*>")
        .expect("valid regex")
});

static IDENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<call>AddDefaultIdentity|AddIdentityCore|AddIdentity)\s*<\s*(?P<ty>[A-Za-z_@][\w.]*)")
        .expect("valid regex")
});

static IDENTITY_STORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<call>AddEntityFrameworkStores)\s*<\s*(?P<ty>[A-Za-z_@][\w.]*)\s*>")
        .expect("valid regex")
});

static PROVIDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\s*(?P<method>UseSqlServer|UseSqlite|UseNpgsql)\s*\(").expect("valid regex"));

static CONNECTION_LOOKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"GetConnectionString\(\s*"(?P<key>[^"]*)"\s*\)"#).expect("valid regex")
});

static CONNECTION_MESSAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Connection string '(?P<key>[^']*)' not found").expect("valid regex"));

static ENDPOINTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bMap(?P<model>\w+?)Endpoints\s*\(").expect("valid regex"));

/// Catalog of substitutable snippet shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenFamily {
    DataContextRegistration,
    IdentityRegistration,
    IdentityStore,
    ProviderSelection,
    ConnectionString,
    EndpointsMapping,
}

impl TokenFamily {
    pub const ALL: [TokenFamily; 6] = [
        Self::DataContextRegistration,
        Self::IdentityRegistration,
        Self::IdentityStore,
        Self::ProviderSelection,
        Self::ConnectionString,
        Self::EndpointsMapping,
    ];

    /// Families occurring in `text`
    #[must_use]
    pub fn detect(text: &str) -> Vec<TokenFamily> {
        Self::ALL
            .into_iter()
            .filter(|family| family.patterns().iter().any(|re| re.is_match(text)))
            .collect()
    }

    fn patterns(self) -> Vec<&'static Regex> {
        match self {
            Self::DataContextRegistration => vec![&*DATA_CONTEXT],
            Self::IdentityRegistration => vec![&*IDENTITY],
            Self::IdentityStore => vec![&*IDENTITY_STORE],
            Self::ProviderSelection => vec![&*PROVIDER],
            Self::ConnectionString => vec![&*CONNECTION_LOOKUP, &*CONNECTION_MESSAGE],
            Self::EndpointsMapping => vec![&*ENDPOINTS],
        }
    }

    /// Replace this family's identifier; `None` when it is not resolved
    #[must_use]
    pub fn substitute(self, text: &str, ids: &IdentifierMap) -> Option<String> {
        match self {
            Self::DataContextRegistration => {
                let context = ids.context_class()?;
                Some(replace_type(&DATA_CONTEXT, text, context, true))
            }
            Self::IdentityRegistration => {
                let user = ids.user_class()?;
                Some(replace_type(&IDENTITY, text, user, false))
            }
            Self::IdentityStore => {
                let context = ids.context_class()?;
                Some(replace_type(&IDENTITY_STORE, text, context, true))
            }
            Self::ProviderSelection => {
                let method = ids.provider()?.registration_method();
                Some(
                    PROVIDER
                        .replace_all(text, |_: &Captures<'_>| format!(".{method}("))
                        .into_owned(),
                )
            }
            Self::ConnectionString => {
                let key = ids.connection_key()?;
                let text = CONNECTION_LOOKUP
                    .replace_all(text, |_: &Captures<'_>| format!("GetConnectionString(\"{key}\")"));
                Some(
                    CONNECTION_MESSAGE
                        .replace_all(&text, |_: &Captures<'_>| format!("Connection string '{key}' not found"))
                        .into_owned(),
                )
            }
            Self::EndpointsMapping => {
                let model = ids.model_class()?;
                Some(
                    ENDPOINTS
                        .replace_all(text, |_: &Captures<'_>| format!("Map{model}Endpoints("))
                        .into_owned(),
                )
            }
        }
    }
}

fn replace_type(re: &Regex, text: &str, name: &str, closed: bool) -> String {
    re.replace_all(text, |caps: &Captures<'_>| {
        if closed {
            format!("{}<{name}>", &caps["call"])
        } else {
            format!("{}<{name}", &caps["call"])
        }
    })
    .into_owned()
}

/// Renders change templates against one run's identifiers
#[derive(Debug, Clone, Copy)]
pub struct TokenSubstitution<'a> {
    ids: &'a IdentifierMap,
}

impl<'a> TokenSubstitution<'a> {
    #[must_use]
    pub fn new(ids: &'a IdentifierMap) -> Self {
        Self { ids }
    }

    /// Rename host placeholders, then fill every resolved family
    #[must_use]
    pub fn render(&self, block: &str) -> String {
        let mut text = rename_hosts(block, self.ids.hosts());
        for family in TokenFamily::detect(&text) {
            match family.substitute(&text, self.ids) {
                Some(rendered) => text = rendered,
                None => log::debug!("{family:?} left unresolved"),
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::DbProvider;
    use pretty_assertions::assert_eq;

    fn ids() -> IdentifierMap {
        IdentifierMap::new()
            .with_context_class("BlogContext")
            .with_user_class("BlogUser")
            .with_provider(DbProvider::Sqlite)
            .with_model_class("Post")
    }

    #[test]
    fn test_detect_families() {
        let families = TokenFamily::detect(
            "builder.Services.AddDbContext<ApplicationDbContext>(o => o.UseSqlServer(builder.Configuration.GetConnectionString(\"DefaultConnection\")));",
        );
        assert_eq!(
            families,
            vec![
                TokenFamily::DataContextRegistration,
                TokenFamily::ProviderSelection,
                TokenFamily::ConnectionString,
            ]
        );
    }

    #[test]
    fn test_render_all_families() {
        let block = concat!(
            "builder.Services.AddDbContext<ApplicationDbContext>(options =>\n",
            "    options.UseSqlServer(builder.Configuration.GetConnectionString(\"ApplicationDbContext\") ?? throw new InvalidOperationException(\"Connection string 'ApplicationDbContext' not found.\")));\n",
            "builder.Services.AddDefaultIdentity<IdentityUser>(options => options.SignIn.RequireConfirmedAccount = true)\n",
            "    .AddEntityFrameworkStores<ApplicationDbContext>();\n",
            "app.MapModelEndpoints();",
        );
        let rendered = TokenSubstitution::new(&ids()).render(block);
        let expected = concat!(
            "builder.Services.AddDbContext<BlogContext>(options =>\n",
            "    options.UseSqlite(builder.Configuration.GetConnectionString(\"BlogContextConnection\") ?? throw new InvalidOperationException(\"Connection string 'BlogContextConnection' not found.\")));\n",
            "builder.Services.AddDefaultIdentity<BlogUser>(options => options.SignIn.RequireConfirmedAccount = true)\n",
            "    .AddEntityFrameworkStores<BlogContext>();\n",
            "app.MapPostEndpoints();",
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_unresolved_families_pass_through() {
        let block = "builder.Services.AddDbContext<ApplicationDbContext>(o => o.UseSqlServer(cs));";
        let rendered = TokenSubstitution::new(&IdentifierMap::new()).render(block);
        assert_eq!(rendered, block);
    }

    #[test]
    fn test_hosts_renamed_before_families() {
        let ids = ids().with_host("builder", "b");
        let rendered = TokenSubstitution::new(&ids).render("builder.Services.AddDbContext<AppDb>();");
        assert_eq!(rendered, "b.Services.AddDbContext<BlogContext>();");
    }
}
