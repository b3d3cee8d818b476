//! Schema validation for application configuration
//!
//! The merged application document is checked against an embedded JSON
//! Schema before being deserialized, so every problem is reported at once
//! with the path of the offending value instead of failing on the first
//! serde error.

use serde_json::{Value as JsonValue, json};

use crate::error::{CoreError, Result, ValidationErrorInfo};

/// Compiled schema for application documents
pub struct AppSchemaValidator {
    compiled: jsonschema::Validator,
}

impl AppSchemaValidator {
    pub fn new() -> Result<Self> {
        Self::with_schema(&app_schema())
    }

    /// Compile a custom schema
    pub fn with_schema(schema: &JsonValue) -> Result<Self> {
        let compiled = jsonschema::validator_for(schema).map_err(|e| CoreError::InvalidConfig {
            message: format!("Invalid schema: {}", e),
        })?;
        Ok(Self { compiled })
    }

    /// Validate a document, collecting every violation
    pub fn validate(&self, document: &JsonValue) -> Result<()> {
        if self.compiled.is_valid(document) {
            return Ok(());
        }

        let errors: Vec<ValidationErrorInfo> = self
            .compiled
            .iter_errors(document)
            .map(|e| {
                let path = e.instance_path.to_string();
                ValidationErrorInfo {
                    path: if path.is_empty() {
                        "(root)".to_string()
                    } else {
                        path
                    },
                    message: e.to_string().replace('"', "'"),
                }
            })
            .collect();

        Err(CoreError::SchemaValidation { errors })
    }
}

fn string_map() -> JsonValue {
    json!({
        "type": "object",
        "additionalProperties": {"type": ["string", "number", "boolean", "null"]}
    })
}

fn per_process(entry: JsonValue) -> JsonValue {
    json!({"type": "object", "additionalProperties": entry})
}

fn probe() -> JsonValue {
    json!({
        "type": "object",
        "required": ["path"],
        "properties": {
            "path": {"type": "string"},
            "delay": {"type": "integer", "minimum": 0},
            "period": {"type": "integer", "minimum": 1},
            "timeout": {"type": "integer", "minimum": 1}
        }
    })
}

fn registry() -> JsonValue {
    json!({
        "type": "object",
        "required": ["organization"],
        "properties": {
            "id": {"type": "string"},
            "organization": {"type": "string"}
        }
    })
}

/// JSON Schema of an application document
pub fn app_schema() -> JsonValue {
    json!({
        "type": "object",
        "required": ["app", "workflow"],
        "properties": {
            "app": {"type": "string", "minLength": 1},
            "workflow": {
                "type": "array",
                "minItems": 1,
                "uniqueItems": true,
                "items": {"type": "string"}
            },
            "git": {
                "type": "object",
                "properties": {
                    "origin": {"type": "string"},
                    "provider": {"type": "string"}
                }
            },
            "processes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "start_command"],
                    "properties": {
                        "name": {"type": "string", "minLength": 1},
                        "is_cronjob": {"type": "boolean"},
                        "start_command": {"type": "string"}
                    }
                }
            },
            "scales": per_process(json!({
                "type": "object",
                "properties": {
                    "minReplicas": {"type": "integer", "minimum": 0},
                    "maxReplicas": {"type": "integer", "minimum": 1},
                    "targetCPUUtilizationPercentage": {"type": "integer", "minimum": 1, "maximum": 100}
                }
            })),
            "resources": per_process(json!({"type": "object"})),
            "nodeSelector": per_process(json!({"type": "object"})),
            "probes": per_process(json!({
                "type": "object",
                "properties": {
                    "liveness": probe(),
                    "readiness": probe(),
                    "path": {"type": "string"},
                    "delay": {"type": "integer", "minimum": 0},
                    "period": {"type": "integer", "minimum": 1},
                    "timeout": {"type": "integer", "minimum": 1}
                }
            })),
            "crons": per_process(json!({
                "type": "object",
                "required": ["schedule"],
                "properties": {
                    "schedule": {"type": "string"},
                    "concurrency_policy": {"enum": ["Allow", "Forbid", "Replace"]}
                }
            })),
            "affinity": per_process(json!({
                "type": "object",
                "properties": {
                    "is_anti_affinity_node_enabled": {"type": "boolean"},
                    "is_anti_affinity_zone_enabled": {"type": "boolean"}
                }
            })),
            "variables": {
                "type": "object",
                "properties": {
                    "app": string_map(),
                    "ope": string_map(),
                    "secret": per_process(json!({
                        "type": "object",
                        "required": ["name", "key"],
                        "properties": {
                            "name": {"type": "string"},
                            "key": {"type": "string"}
                        }
                    }))
                }
            },
            "docker": {
                "type": "object",
                "properties": {
                    "registry": registry(),
                    "registries": per_process(json!({"type": "array", "items": registry()}))
                }
            },
            "registry": {
                "type": "object",
                "required": ["platform", "id"],
                "properties": {
                    "platform": {"type": "string"},
                    "id": {"type": "string"}
                }
            },
            "build": {
                "type": "object",
                "properties": {"variables": string_map()}
            },
            "namespace": {"type": "string"},
            "secret": {"type": "string"},
            "service": {
                "type": "object",
                "properties": {"port": {"type": "integer", "minimum": 1, "maximum": 65535}}
            },
            "cluster_name": {"type": "string"}
        }
    })
}
