//! Built-in metric definitions for known LDAP server vendors.

use tracing::{debug, info, warn};

use ldap_exporter_core::{
    ConfigError, DerefAliases, Directory, DirectoryError, MATCH_ALL_FILTER, MetricsSource, Scope,
    SearchRequest, load_config,
};

/// Root DSE attribute naming the server vendor.
const VENDOR_NAME_ATTRIBUTE: &str = "vendorname";

const VENDOR_389: &str = "389 Project";

const DEFINITIONS_389: &str = include_str!("../definitions/389.yaml");

/// Errors raised while loading vendor metrics.
#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("Failed to identify LDAP vendor: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Built-in metrics for {vendor} are invalid: {source}")]
    Definitions {
        vendor: &'static str,
        #[source]
        source: ConfigError,
    },
}

/// A vendor with built-in metric definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    /// 389 Directory Server.
    Ds389,
}

impl Vendor {
    /// Match a root DSE `vendorname` value.
    pub fn from_vendor_name(name: &str) -> Option<Self> {
        match name {
            VENDOR_389 => Some(Vendor::Ds389),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Ds389 => "389 Directory Server",
        }
    }

    fn definitions(&self) -> &'static str {
        match self {
            Vendor::Ds389 => DEFINITIONS_389,
        }
    }

    /// Load this vendor's metric sources.
    pub fn load_sources(&self) -> Result<Vec<MetricsSource>, VendorError> {
        load_config(self.definitions()).map_err(|e| VendorError::Definitions {
            vendor: self.as_str(),
            source: e,
        })
    }
}

/// Identify the server vendor from the root DSE.
pub async fn detect_vendor(directory: &dyn Directory) -> Result<Option<Vendor>, DirectoryError> {
    debug!("Attempting to identify the LDAP vendor");

    let request = SearchRequest::new(
        "",
        Scope::BaseObject,
        DerefAliases::Never,
        MATCH_ALL_FILTER,
        vec![VENDOR_NAME_ATTRIBUTE.to_string()],
    );
    let entries = directory.search(&request).await?;

    let vendor = entries
        .iter()
        .flat_map(|entry| &entry.attributes)
        .filter(|attr| attr.name.eq_ignore_ascii_case(VENDOR_NAME_ATTRIBUTE) && attr.values.len() == 1)
        .find_map(|attr| Vendor::from_vendor_name(&attr.values[0]));

    Ok(vendor)
}

/// Load the built-in metrics for the server behind `directory`.
///
/// An unidentified vendor yields no sources.
pub async fn load_vendor_sources(directory: &dyn Directory) -> Result<Vec<MetricsSource>, VendorError> {
    match detect_vendor(directory).await? {
        Some(vendor) => {
            info!(vendor = vendor.as_str(), "Loading built-in metrics for LDAP vendor");
            vendor.load_sources()
        }
        None => {
            warn!("Couldn't identify the LDAP vendor, no built-in metrics will be enabled");
            Ok(Vec::new())
        }
    }
}
