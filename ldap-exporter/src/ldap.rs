//! LDAP directory client backed by `ldap3`.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, SearchEntry, SearchOptions};
use tracing::{debug, info, warn};

use ldap_exporter_core::{
    DerefAliases, Directory, DirectoryEntry, DirectoryError, EntryAttribute, Scope, SearchRequest,
};

use crate::config::LdapConfig;

/// A bound LDAP connection shared by every metrics source.
///
/// The connection is driven by a background task; each search works on a
/// cheap clone of the handle.
pub struct LdapDirectory {
    ldap: Ldap,
    config: LdapConfig,
}

impl LdapDirectory {
    /// Connect to the configured server and bind.
    ///
    /// Binds anonymously unless a bind DN is configured.
    pub async fn connect(config: &LdapConfig) -> Result<Self, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(config.timeout())
            .set_starttls(config.starttls)
            .set_no_tls_verify(config.tls_skip_verify);

        debug!(uri = %config.uri, starttls = config.starttls, "Connecting to LDAP server");

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &config.uri)
            .await
            .map_err(|e| DirectoryError::Connection(format!("{}: {}", config.uri, e)))?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection error");
            }
        });

        if let (Some(bind_dn), Some(password)) = (&config.bind_dn, &config.bind_password) {
            ldap.with_timeout(config.timeout())
                .simple_bind(bind_dn, password)
                .await
                .and_then(|result| result.success())
                .map_err(|e| DirectoryError::Connection(format!("bind as '{}' failed: {}", bind_dn, e)))?;
            info!(uri = %config.uri, bind_dn = %bind_dn, "Bound to LDAP server");
        } else {
            info!(uri = %config.uri, "Connected to LDAP server anonymously");
        }

        Ok(Self {
            ldap,
            config: config.clone(),
        })
    }

    /// Close the connection.
    pub async fn unbind(&self) {
        let mut ldap = self.ldap.clone();
        if let Err(e) = ldap.unbind().await {
            warn!(error = %e, "LDAP unbind failed");
        }
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let options = SearchOptions::new()
            .deref(deref_aliases(request.deref))
            .sizelimit(request.size_limit)
            .timelimit(request.time_limit);

        let mut ldap = self.ldap.clone();
        let (entries, _) = ldap
            .with_search_options(options)
            .with_timeout(self.config.timeout())
            .search(
                &request.base_dn,
                scope(request.scope),
                &request.filter,
                request.attributes.clone(),
            )
            .await
            .and_then(|result| result.success())
            .map_err(|e| DirectoryError::Search(e.to_string()))?;

        debug!(search = %request, entries = entries.len(), "LDAP search complete");

        Ok(entries
            .into_iter()
            .map(|entry| to_directory_entry(SearchEntry::construct(entry)))
            .collect())
    }
}

fn scope(scope: Scope) -> ldap3::Scope {
    match scope {
        Scope::BaseObject => ldap3::Scope::Base,
        Scope::SingleLevel => ldap3::Scope::OneLevel,
        Scope::WholeSubtree => ldap3::Scope::Subtree,
    }
}

fn deref_aliases(deref: DerefAliases) -> ldap3::DerefAliases {
    match deref {
        DerefAliases::Never => ldap3::DerefAliases::Never,
        DerefAliases::InSearching => ldap3::DerefAliases::Searching,
        DerefAliases::FindingBaseObject => ldap3::DerefAliases::Finding,
        DerefAliases::Always => ldap3::DerefAliases::Always,
    }
}

/// Convert an `ldap3` entry, sorting attributes by name.
///
/// Binary values are converted lossily to text.
fn to_directory_entry(entry: SearchEntry) -> DirectoryEntry {
    let mut attributes: Vec<EntryAttribute> = entry
        .attrs
        .into_iter()
        .map(|(name, values)| EntryAttribute { name, values })
        .collect();

    for (name, values) in entry.bin_attrs {
        let values: Vec<String> = values
            .into_iter()
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .collect();
        attributes.push(EntryAttribute { name, values });
    }

    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    DirectoryEntry {
        dn: entry.dn,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(scope(Scope::BaseObject), ldap3::Scope::Base));
        assert!(matches!(scope(Scope::SingleLevel), ldap3::Scope::OneLevel));
        assert!(matches!(scope(Scope::WholeSubtree), ldap3::Scope::Subtree));
    }

    #[test]
    fn test_deref_mapping() {
        assert!(matches!(
            deref_aliases(DerefAliases::Never),
            ldap3::DerefAliases::Never
        ));
        assert!(matches!(
            deref_aliases(DerefAliases::Always),
            ldap3::DerefAliases::Always
        ));
    }

    #[test]
    fn test_entry_conversion_sorts_attributes() {
        let mut attrs = HashMap::new();
        attrs.insert("threads".to_string(), vec!["4".to_string()]);
        attrs.insert("currentconnections".to_string(), vec!["12".to_string()]);
        let mut bin_attrs = HashMap::new();
        bin_attrs.insert("blob".to_string(), vec![b"raw".to_vec()]);

        let entry = to_directory_entry(SearchEntry {
            dn: "cn=monitor".to_string(),
            attrs,
            bin_attrs,
        });

        assert_eq!(entry.dn, "cn=monitor");
        let names: Vec<&str> = entry.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["blob", "currentconnections", "threads"]);
        assert_eq!(entry.attributes[0].values, vec!["raw"]);
    }
}
