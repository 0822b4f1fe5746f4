use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "subdomain_file": { "type": "string" },
            "user_agent": { "type": "string", "minLength": 1 },
            "scope": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "url": { "type": "string" },
                    "platform": { "type": "string" },
                    "offers_bounties": { "type": "boolean" },
                    "in_scope": { "type": "array", "items": { "type": "string" } },
                    "out_of_scope": { "type": "array", "items": { "type": "string" } }
                }
            },
            "crawler": {
                "type": "object",
                "properties": {
                    "timeout": { "$ref": "#/$defs/duration" },
                    "backoff": { "$ref": "#/$defs/duration" },
                    "workers": { "type": "integer", "minimum": 1 },
                    "regexes": { "type": "array", "items": { "type": "string" } },
                    "targets_per_subdomain": { "type": "integer", "minimum": 1 }
                }
            },
            "attack": {
                "type": "object",
                "properties": {
                    "timeout": { "$ref": "#/$defs/duration" },
                    "backoff": { "$ref": "#/$defs/duration" },
                    "workers": { "type": "integer", "minimum": 1 }
                }
            },
            "triage": {
                "type": "object",
                "properties": {
                    "workers": { "type": "integer", "minimum": 1 }
                }
            },
            "catalogues": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" }
                }
            },
            "notifications": {
                "type": "object",
                "properties": {
                    "webhook_url": { "type": "string" },
                    "send_status": { "type": "boolean" },
                    "status_interval": { "$ref": "#/$defs/duration" }
                }
            },
            "output": {
                "type": "object",
                "properties": {
                    "results_file": { "type": "string" }
                }
            }
        },
        "$defs": {
            "duration": {
                "type": "string",
                "pattern": "^[0-9]+(ms|s|m|h)$"
            }
        }
    })
});
