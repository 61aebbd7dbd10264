//! KV-backed persistence for the control-plane entities - tenants, fleets,
//! API keys, role templates, squads. spec.md §1 places SQL schemas out of
//! scope beyond the fields the core consumes, so these ride the same
//! `KvStore` abstraction as queues/threads/escalations rather than a
//! dedicated relational store.

use ringforge_core::{
    ApiKey, ApiKeyId, Fleet, FleetId, RingForgeResult, RoleTemplate, RoleTemplateId, Squad, SquadId, Tenant, TenantId,
};
use ringforge_storage::{get_json, list_prefix_tail, put_json, KvStore};
use std::sync::Arc;

fn tenant_key(id: &TenantId) -> String {
    format!("tenant:{id}")
}

fn fleet_key(id: &FleetId) -> String {
    format!("fleet:{id}")
}

fn api_key_key(id: &ApiKeyId) -> String {
    format!("apikey:{id}")
}

fn role_template_key(id: &RoleTemplateId) -> String {
    format!("roletemplate:{id}")
}

fn squad_key(fleet_id: &FleetId, id: &SquadId) -> String {
    format!("squad:{fleet_id}:{id}")
}

/// Thin CRUD wrapper over the shared `KvStore` for admin-managed entities.
pub struct AdminStore {
    store: Arc<dyn KvStore>,
}

impl AdminStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn put_tenant(&self, tenant: &Tenant) -> RingForgeResult<()> {
        put_json(self.store.as_ref(), &tenant_key(&tenant.id), tenant).await
    }

    pub async fn get_tenant(&self, id: &TenantId) -> RingForgeResult<Option<Tenant>> {
        get_json(self.store.as_ref(), &tenant_key(id)).await
    }

    pub async fn put_fleet(&self, fleet: &Fleet) -> RingForgeResult<()> {
        put_json(self.store.as_ref(), &fleet_key(&fleet.id), fleet).await
    }

    pub async fn get_fleet(&self, id: &FleetId) -> RingForgeResult<Option<Fleet>> {
        get_json(self.store.as_ref(), &fleet_key(id)).await
    }

    pub async fn put_api_key(&self, key: &ApiKey) -> RingForgeResult<()> {
        put_json(self.store.as_ref(), &api_key_key(&key.id), key).await
    }

    pub async fn get_api_key(&self, id: &ApiKeyId) -> RingForgeResult<Option<ApiKey>> {
        get_json(self.store.as_ref(), &api_key_key(id)).await
    }

    pub async fn list_api_keys_for_fleet(&self, fleet_id: &FleetId) -> RingForgeResult<Vec<ApiKey>> {
        let entries = self.store.list_prefix("apikey:").await?;
        let mut keys = Vec::new();
        for (_, raw) in entries {
            if let Ok(key) = serde_json::from_str::<ApiKey>(&raw) {
                if &key.fleet_id == fleet_id {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    /// Linear scan over every stored key. Admin key management is
    /// low-volume and off the per-message hot path, so a prefix scan plus
    /// constant-time secret compare is simpler than maintaining a
    /// secret-indexed secondary key.
    pub async fn find_api_key_by_secret(&self, presented: &str) -> Option<ApiKey> {
        let entries = self.store.list_prefix("apikey:").await.ok()?;
        entries.into_iter().find_map(|(_, raw)| {
            serde_json::from_str::<ApiKey>(&raw)
                .ok()
                .filter(|key| constant_time_eq(key.raw_secret.as_bytes(), presented.as_bytes()))
        })
    }

    pub async fn put_role_template(&self, template: &RoleTemplate) -> RingForgeResult<()> {
        put_json(self.store.as_ref(), &role_template_key(&template.id), template).await
    }

    pub async fn get_role_template(&self, id: &RoleTemplateId) -> RingForgeResult<Option<RoleTemplate>> {
        get_json(self.store.as_ref(), &role_template_key(id)).await
    }

    pub async fn put_squad(&self, squad: &Squad) -> RingForgeResult<()> {
        put_json(self.store.as_ref(), &squad_key(&squad.fleet_id, &squad.id), squad).await
    }

    pub async fn get_squad(&self, fleet_id: &FleetId, id: &SquadId) -> RingForgeResult<Option<Squad>> {
        get_json(self.store.as_ref(), &squad_key(fleet_id, id)).await
    }

    pub async fn list_squads_for_fleet(&self, fleet_id: &FleetId) -> RingForgeResult<Vec<Squad>> {
        let prefix = format!("squad:{fleet_id}:");
        let entries = list_prefix_tail(self.store.as_ref(), &prefix, usize::MAX, None).await?;
        Ok(entries.into_iter().filter_map(|(_, raw)| serde_json::from_str(&raw).ok()).collect())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use ringforge_core::ApiKeyKind;
    use ringforge_storage::InMemoryKvStore;

    #[tokio::test]
    async fn round_trips_a_fleet() {
        let admin = AdminStore::new(InMemoryKvStore::new());
        let fleet = Fleet { id: FleetId::new_v4(), tenant_id: TenantId::new_v4(), name: "core".to_string() };
        admin.put_fleet(&fleet).await.unwrap();
        let got = admin.get_fleet(&fleet.id).await.unwrap().unwrap();
        assert_eq!(got.name, "core");
    }

    #[tokio::test]
    async fn finds_a_key_by_its_secret() {
        let admin = AdminStore::new(InMemoryKvStore::new());
        let fleet_id = FleetId::new_v4();
        let key = ApiKey {
            id: ApiKeyId::new_v4(),
            fleet_id,
            kind: ApiKeyKind::Live,
            raw_secret: "rf_live_abc123".to_string(),
            revoked: false,
        };
        admin.put_api_key(&key).await.unwrap();
        let found = admin.find_api_key_by_secret("rf_live_abc123").await.unwrap();
        assert_eq!(found.id, key.id);
        assert!(admin.find_api_key_by_secret("wrong").await.is_none());
    }
}
