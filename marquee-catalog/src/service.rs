use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Service tiers offered in the catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceTier {
    Standard,
    Premium,
    Exclusive,
}

/// Distance band between the celebrity's base and the event location
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelTier {
    Local,
    Regional,
    National,
    International,
}

/// Security band derived from expected attendee count
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityTier {
    Standard,
    Enhanced,
    Maximum,
}

/// Optional extra on top of a catalog service (e.g. meet & greet, signed merch)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddOn {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Celebrity {
    pub id: Uuid,
    pub name: String,
    /// Typical engagement fee range, minor units
    pub typical_fee_min: i64,
    pub typical_fee_max: i64,
    /// Tier override of the global deposit rate
    #[serde(default)]
    pub deposit_rate_bps: Option<u32>,
}

/// A bookable service in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub id: Uuid,
    pub celebrity_id: Uuid,
    pub code: String,
    pub name: String,
    pub tier: ServiceTier,
    pub base_price: i64,
    pub default_duration_minutes: u32,
    #[serde(default)]
    pub add_ons: Vec<AddOn>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ServiceEntry {
    pub fn add_on(&self, id: &Uuid) -> Option<&AddOn> {
        self.add_ons.iter().find(|a| a.id == *id)
    }
}

/// Travel and security fee tables. Catalog data, not computed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierTables {
    pub travel: HashMap<TravelTier, i64>,
    pub security: HashMap<SecurityTier, i64>,
}

impl TierTables {
    pub fn travel_fee(&self, tier: TravelTier) -> Option<i64> {
        self.travel.get(&tier).copied()
    }

    pub fn security_fee(&self, tier: SecurityTier) -> Option<i64> {
        self.security.get(&tier).copied()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog entry not found: {0}")]
    NotFound(String),

    #[error("Invalid catalog data: {0}")]
    Invalid(String),

    #[error("Catalog parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read access to the external service catalog
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn get_service(&self, id: Uuid) -> Result<Option<ServiceEntry>, CatalogError>;

    async fn get_celebrity(&self, id: Uuid) -> Result<Option<Celebrity>, CatalogError>;

    async fn tier_tables(&self) -> Result<TierTables, CatalogError>;
}

#[derive(Debug, Default, Deserialize)]
struct CatalogDocument {
    celebrities: Vec<Celebrity>,
    services: Vec<ServiceEntry>,
    #[serde(default)]
    tiers: TierTables,
}

/// Catalog held in memory, loaded from a JSON document at start-up
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    celebrities: HashMap<Uuid, Celebrity>,
    services: HashMap<Uuid, ServiceEntry>,
    tiers: TierTables,
}

impl StaticCatalog {
    pub fn new(tiers: TierTables) -> Self {
        Self {
            celebrities: HashMap::new(),
            services: HashMap::new(),
            tiers,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_json::from_str(raw)?;
        let mut catalog = Self::new(doc.tiers);

        for celebrity in doc.celebrities {
            catalog.insert_celebrity(celebrity);
        }
        for service in doc.services {
            catalog.insert_service(service)?;
        }

        Ok(catalog)
    }

    pub fn insert_celebrity(&mut self, celebrity: Celebrity) {
        self.celebrities.insert(celebrity.id, celebrity);
    }

    /// Services must reference a known celebrity
    pub fn insert_service(&mut self, service: ServiceEntry) -> Result<(), CatalogError> {
        if !self.celebrities.contains_key(&service.celebrity_id) {
            return Err(CatalogError::Invalid(format!(
                "service {} references unknown celebrity {}",
                service.code, service.celebrity_id
            )));
        }
        if service.base_price < 0 || service.add_ons.iter().any(|a| a.price < 0) {
            return Err(CatalogError::Invalid(format!("service {} has a negative price", service.code)));
        }

        self.services.insert(service.id, service);
        Ok(())
    }

    pub fn services_for(&self, celebrity_id: Uuid) -> Vec<&ServiceEntry> {
        self.services.values().filter(|s| s.celebrity_id == celebrity_id).collect()
    }
}

#[async_trait]
impl ServiceCatalog for StaticCatalog {
    async fn get_service(&self, id: Uuid) -> Result<Option<ServiceEntry>, CatalogError> {
        Ok(self.services.get(&id).cloned())
    }

    async fn get_celebrity(&self, id: Uuid) -> Result<Option<Celebrity>, CatalogError> {
        Ok(self.celebrities.get(&id).cloned())
    }

    async fn tier_tables(&self) -> Result<TierTables, CatalogError> {
        Ok(self.tiers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_from_json() {
        let celebrity_id = Uuid::new_v4();
        let service_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "celebrities": [{
                "id": celebrity_id,
                "name": "Ava Stone",
                "typical_fee_min": 1000000,
                "typical_fee_max": 3000000
            }],
            "services": [{
                "id": service_id,
                "celebrity_id": celebrity_id,
                "code": "KEYNOTE",
                "name": "Keynote appearance",
                "tier": "PREMIUM",
                "base_price": 2500000,
                "default_duration_minutes": 60
            }],
            "tiers": {
                "travel": { "LOCAL": 0, "INTERNATIONAL": 300000 },
                "security": { "STANDARD": 50000 }
            }
        })
        .to_string();

        let catalog = StaticCatalog::from_json(&raw).unwrap();
        assert_eq!(catalog.services_for(celebrity_id).len(), 1);
        assert_eq!(catalog.tiers.travel_fee(TravelTier::International), Some(300000));
        assert_eq!(catalog.tiers.security_fee(SecurityTier::Maximum), None);
        assert!(catalog.services.get(&service_id).unwrap().is_active);
    }

    #[test]
    fn test_service_requires_known_celebrity() {
        let mut catalog = StaticCatalog::default();
        let result = catalog.insert_service(ServiceEntry {
            id: Uuid::new_v4(),
            celebrity_id: Uuid::new_v4(),
            code: "MEET".to_string(),
            name: "Meet & greet".to_string(),
            tier: ServiceTier::Standard,
            base_price: 100,
            default_duration_minutes: 30,
            add_ons: vec![],
            is_active: true,
        });
        assert!(matches!(result, Err(CatalogError::Invalid(_))));
    }
}
