//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```ignore
//! use hmi_link::{Client, HmiConfig, Url};
//!
//! let mut client = Client::builder()
//!     .origin(Url::parse("http://plc.local:8009/index.html")?)
//!     .config(HmiConfig::from_file("hmi.json")?)
//!     .build()?;
//!
//! client.run().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::config::HmiConfig;
use crate::error::{Error, Result};
use crate::session::{
    EditSurface, MemoryStore, NullSurface, PageWidget, PageWidgets, PersistentStore,
    RenderSurface, Session,
};
use crate::transport::{origin_requests_watchdog, ws_url};

use super::core::Client;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Default)]
pub struct ClientBuilder {
    /// Page origin the transport URL is derived from.
    origin: Option<Url>,
    /// Static HMI tables.
    config: Option<HmiConfig>,
    /// Runtime options.
    options: ClientOptions,
    /// Widgets per page name.
    widgets: PageWidgets,
    /// Rendering collaborator.
    surface: Option<Box<dyn RenderSurface>>,
    /// Editing collaborator.
    editor: Option<Box<dyn EditSurface>>,
    /// Persisted local values.
    store: Option<Box<dyn PersistentStore>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("origin", &self.origin.as_ref().map(Url::as_str))
            .field("config", &self.config.is_some())
            .field("options", &self.options)
            .field("pages_with_widgets", &self.widgets.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page origin, e.g. `http://plc.local:8009/index.html`.
    ///
    /// A `#watchdog` fragment enables watchdog mode.
    #[inline]
    #[must_use]
    pub fn origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Sets the static HMI configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: HmiConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the runtime options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the widgets of a page, page widget first.
    #[must_use]
    pub fn page_widgets(
        mut self,
        page: impl Into<String>,
        widgets: Vec<(Arc<dyn PageWidget>, bool)>,
    ) -> Self {
        self.widgets.insert(page.into(), widgets);
        self
    }

    /// Appends one widget to a page.
    #[must_use]
    pub fn widget(mut self, page: impl Into<String>, widget: Arc<dyn PageWidget>, relativeness: bool) -> Self {
        self.widgets
            .entry(page.into())
            .or_default()
            .push((widget, relativeness));
        self
    }

    /// Sets the rendering collaborator. Defaults to [`NullSurface`].
    #[inline]
    #[must_use]
    pub fn surface(mut self, surface: impl RenderSurface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    /// Sets the editing collaborator. Defaults to [`NullSurface`].
    #[inline]
    #[must_use]
    pub fn edit_surface(mut self, editor: impl EditSurface + 'static) -> Self {
        self.editor = Some(Box::new(editor));
        self
    }

    /// Sets the persistent store. Defaults to an in-memory store.
    #[inline]
    #[must_use]
    pub fn store(mut self, store: impl PersistentStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Builds the client with validation.
    ///
    /// The session is created and enters the default page; nothing is
    /// connected until [`Client::run`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if origin or configuration is missing or invalid
    /// - [`Error::Config`] if the options are invalid
    /// - Storage errors while loading persisted values
    pub fn build(self) -> Result<Client> {
        let origin = self.validate_origin()?;
        let config = self.config.ok_or_else(|| {
            Error::config(
                "HMI configuration is required. Use .config() to set it.\n\
                 Example: Client::builder().config(HmiConfig::from_file(\"hmi.json\")?)",
            )
        })?;
        self.options.validate().map_err(Error::config)?;

        let watchdog = self.options.watchdog || origin_requests_watchdog(&origin);
        let url = ws_url(&origin, watchdog)?;
        debug!(url = %url, watchdog, "Transport URL derived");

        let store = self.store.unwrap_or_else(|| Box::new(MemoryStore::new()));
        let session = Session::new(
            config,
            self.widgets,
            store,
            watchdog,
            self.options.reconnect_increment,
        )?;

        let options = if watchdog {
            self.options.with_watchdog()
        } else {
            self.options
        };

        Ok(Client::new(
            url,
            session,
            self.surface.unwrap_or_else(|| Box::new(NullSurface)),
            self.editor.unwrap_or_else(|| Box::new(NullSurface)),
            options,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates the origin configuration.
    fn validate_origin(&self) -> Result<Url> {
        self.origin.clone().ok_or_else(|| {
            Error::config(
                "Origin URL is required. Use .origin() to set it.\n\
                 Example: Client::builder().origin(Url::parse(\"http://plc.local:8009/\")?)",
            )
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
