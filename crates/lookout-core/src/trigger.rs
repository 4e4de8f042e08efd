use crate::error::{CoreError, Result};
use crate::types::AuditLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of action a trigger performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    /// Run a CI job pipeline with runtime parameters
    #[serde(rename = "DEVTRON_JOB")]
    DevtronJob,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::DevtronJob => "DEVTRON_JOB",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeParameter {
    pub key: String,
    pub value: String,
}

/// Payload of a `DEVTRON_JOB` trigger
///
/// Requests carry the names only; the numeric ids are stamped by the
/// reference resolver and stay `0` when a name does not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTriggerData {
    pub job_name: String,
    #[serde(default)]
    pub job_id: u64,
    pub pipeline_name: String,
    #[serde(default)]
    pub pipeline_id: u64,
    #[serde(default)]
    pub execution_environment: String,
    #[serde(default)]
    pub execution_environment_id: u64,
    #[serde(default)]
    pub workflow_id: u64,
    #[serde(default)]
    pub runtime_parameters: Vec<RuntimeParameter>,
}

impl JobTriggerData {
    pub fn new(
        job_name: impl Into<String>,
        pipeline_name: impl Into<String>,
        execution_environment: impl Into<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            job_id: 0,
            pipeline_name: pipeline_name.into(),
            pipeline_id: 0,
            execution_environment: execution_environment.into(),
            execution_environment_id: 0,
            workflow_id: 0,
            runtime_parameters: Vec::new(),
        }
    }

    pub fn with_runtime_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.runtime_parameters.push(RuntimeParameter {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Drop every resolved id, keeping only the operator-authored fields
    pub fn without_ids(&self) -> Self {
        Self {
            job_id: 0,
            pipeline_id: 0,
            execution_environment_id: 0,
            workflow_id: 0,
            ..self.clone()
        }
    }

    /// The executor can only run a job whose pipeline resolved
    pub fn is_runnable(&self) -> bool {
        self.pipeline_id != 0
    }
}

/// Trigger as authored in a watcher request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub identifier_type: TriggerType,
    pub data: JobTriggerData,
}

/// Persisted trigger row (`auto_remediation_trigger`)
///
/// `data` is kept as JSON text so new trigger kinds do not change the row
/// layout; [`Trigger::job_data`] enforces that it matches `trigger_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: u64,
    pub watcher_id: u64,
    pub trigger_type: TriggerType,
    pub data: String,
    pub active: bool,
    pub audit: AuditLog,
}

impl Trigger {
    /// Build an unsaved job trigger row for a watcher
    pub fn new_job(
        watcher_id: u64,
        data: &JobTriggerData,
        user: u64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let data = serde_json::to_string(data).map_err(|e| {
            CoreError::serialization_error(
                format!("Failed to encode trigger data: {}", e),
                Some(Box::new(e)),
            )
        })?;

        Ok(Self {
            id: 0,
            watcher_id,
            trigger_type: TriggerType::DevtronJob,
            data,
            active: true,
            audit: AuditLog::new(user, now),
        })
    }

    /// Decode the payload according to the declared trigger type
    pub fn job_data(&self) -> Result<JobTriggerData> {
        match self.trigger_type {
            TriggerType::DevtronJob => serde_json::from_str(&self.data).map_err(|e| {
                CoreError::invalid_trigger_data(self.trigger_type.as_str(), e.to_string())
            }),
        }
    }

    pub fn to_dto(&self) -> Result<TriggerDto> {
        Ok(TriggerDto {
            id: self.id,
            identifier_type: self.trigger_type,
            data: self.job_data()?,
        })
    }
}

/// Trigger as returned by the read APIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDto {
    pub id: u64,
    pub identifier_type: TriggerType,
    pub data: JobTriggerData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_data_round_trips_through_row() {
        let data =
            JobTriggerData::new("notify", "p1", "dev").with_runtime_parameter("LEVEL", "warn");
        let trigger = Trigger::new_job(7, &data, 1, Utc::now()).unwrap();

        assert_eq!(trigger.trigger_type, TriggerType::DevtronJob);
        assert!(trigger.active);
        assert_eq!(trigger.job_data().unwrap(), data);
    }

    #[test]
    fn test_mismatched_payload_is_rejected() {
        let mut trigger =
            Trigger::new_job(1, &JobTriggerData::new("a", "b", "c"), 1, Utc::now()).unwrap();
        trigger.data = r#"{"url":"http://hook"}"#.to_string();

        let err = trigger.job_data().unwrap_err();
        assert!(matches!(err, CoreError::InvalidTriggerData { .. }));
    }

    #[test]
    fn test_request_wire_format() {
        let req: TriggerRequest = serde_json::from_str(
            r#"{"identifierType":"DEVTRON_JOB","data":{"jobName":"notify","pipelineName":"p1",
                "executionEnvironment":"dev","runtimeParameters":[{"key":"K","value":"V"}]}}"#,
        )
        .unwrap();
        assert_eq!(req.identifier_type, TriggerType::DevtronJob);
        assert_eq!(req.data.job_id, 0);
        assert_eq!(req.data.runtime_parameters.len(), 1);

        let unknown = serde_json::from_str::<TriggerRequest>(
            r#"{"identifierType":"WEBHOOK","data":{"jobName":"a","pipelineName":"b"}}"#,
        );
        assert!(unknown.is_err());
    }
}
