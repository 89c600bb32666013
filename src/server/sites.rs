use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{Site, SiteStatus};

/// Read-only view of the sites the pipeline samples. Site records are
/// owned by the CRUD layer; this directory only mirrors them.
#[derive(Debug, Default)]
pub struct SiteDirectory {
    sites: RwLock<HashMap<String, Site>>,
}

impl SiteDirectory {
    pub fn new(seed: Vec<Site>) -> Self {
        let sites = seed.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            sites: RwLock::new(sites),
        }
    }

    pub fn get(&self, site_id: &str) -> Option<Site> {
        self.sites.read().unwrap_or_else(|e| e.into_inner()).get(site_id).cloned()
    }

    /// Only `online` sites are sampled on a tick.
    pub fn online_sites(&self) -> Vec<Site> {
        self.sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| s.is_online())
            .cloned()
            .collect()
    }

    /// Applies a status change pushed from the CRUD layer.
    pub fn set_status(&self, site_id: &str, status: SiteStatus) {
        if let Some(site) = self
            .sites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(site_id)
        {
            site.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(id: &str, status: SiteStatus) -> Site {
        Site {
            id: id.to_string(),
            name: id.to_string(),
            status,
        }
    }

    #[test]
    fn online_sites_excludes_offline_and_maintenance() {
        let directory = SiteDirectory::new(vec![
            site("a", SiteStatus::Online),
            site("b", SiteStatus::Offline),
            site("c", SiteStatus::Maintenance),
        ]);
        let online = directory.online_sites();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, "a");
    }

    #[test]
    fn set_status_takes_a_site_out_of_rotation() {
        let directory = SiteDirectory::new(vec![site("a", SiteStatus::Online)]);
        directory.set_status("a", SiteStatus::Maintenance);
        assert!(directory.online_sites().is_empty());
    }
}
