use std::fmt;
use std::sync::Arc;

use log::{error, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::remote::RemoteJobClient;

/// Reserved processing unit tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservedUnitType {
    S1,
    S2,
    S3,
}

impl fmt::Display for ReservedUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReservedUnitType::S1 => "S1",
            ReservedUnitType::S2 => "S2",
            ReservedUnitType::S3 => "S3",
        };
        f.write_str(name)
    }
}

/// Reserved capacity as reported by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityInfo {
    pub unit_type: Option<ReservedUnitType>,
    pub max_units: Option<u32>,
    pub current_units: Option<u32>,
    pub account_id: Option<Uuid>,
}

/// Capacity change sent to the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityUpdate {
    pub account_id: Uuid,
    pub unit_type: ReservedUnitType,
    pub units: u32,
}

/// Reads and adjusts the account's reserved processing capacity.
///
/// The remote service is authoritative on which unit/type combinations are valid; only the
/// presence of an account id is checked here.
#[derive(Clone)]
pub struct ReservedCapacityManager {
    client: Arc<dyn RemoteJobClient>,
}

impl ReservedCapacityManager {
    pub fn new(client: Arc<dyn RemoteJobClient>) -> Self {
        Self { client }
    }

    pub async fn current_capacity(&self) -> Result<CapacityInfo> {
        let info = self.client.get_reserved_capacity().await.map_err(|e| {
            error!("Failed to read reserved capacity: {}", e);
            OrchestratorError::remote("reading reserved capacity", e)
        })?;

        info.ok_or_else(|| OrchestratorError::not_found("reserved capacity", "account"))
    }

    pub async fn set_capacity(&self, unit_type: ReservedUnitType, units: u32) -> Result<()> {
        let current = self.current_capacity().await?;
        let account_id = current
            .account_id
            .ok_or_else(|| OrchestratorError::validation("reserved capacity has no account id"))?;

        let update = CapacityUpdate {
            account_id,
            unit_type,
            units,
        };

        self.client.update_reserved_capacity(&update).await.map_err(|e| {
            error!("Failed to set reserved capacity to {} x {}: {}", units, unit_type, e);
            OrchestratorError::remote(format!("setting reserved capacity to {units} x {unit_type}"), e)
        })?;

        info!("Reserved capacity set to {} x {}", units, unit_type);
        Ok(())
    }

    /// Record capacity and raise it to `units` of `unit_type` if none is reserved.
    ///
    /// Call [`CapacityLease::restore`] once the batch is done.
    pub async fn ensure_capacity(&self, unit_type: ReservedUnitType, units: u32) -> Result<CapacityLease> {
        let recorded = self.current_capacity().await?;

        let raised = recorded.current_units.unwrap_or(0) == 0;
        if raised {
            info!("No reserved capacity, provisioning {} x {}", units, unit_type);
            self.set_capacity(unit_type, units).await?;
        }

        Ok(CapacityLease {
            manager: self.clone(),
            recorded,
            raised,
        })
    }
}

/// Capacity recorded before a batch; restores it afterward if it was raised
pub struct CapacityLease {
    manager: ReservedCapacityManager,
    recorded: CapacityInfo,
    raised: bool,
}

impl CapacityLease {
    pub fn raised(&self) -> bool {
        self.raised
    }

    pub async fn restore(self) -> Result<()> {
        if !self.raised {
            return Ok(());
        }

        let unit_type = self.recorded.unit_type.unwrap_or(ReservedUnitType::S1);
        let units = self.recorded.current_units.unwrap_or(0);
        info!("Restoring reserved capacity to {} x {}", units, unit_type);
        self.manager.set_capacity(unit_type, units).await
    }
}
