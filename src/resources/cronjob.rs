//! CronJob invoking a Function on schedule

use std::collections::BTreeMap;
use std::str::FromStr;

use cron::Schedule;
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, ObjectFieldSelector, PodSpec, PodTemplateSpec,
};
use kube::ResourceExt;

use super::{namespace_of, owned_meta, service_port, Synthesizer};
use crate::crd::{CronJobTrigger, Function};
use crate::error::{Error, Result};

/// Finished jobs kept per outcome
const SUCCESSFUL_JOBS_HISTORY: i32 = 3;
const FAILED_JOBS_HISTORY: i32 = 1;

/// Name of the CronJob backing a trigger
pub fn cron_job_name(trigger_name: &str) -> String {
    format!("trigger-{}", trigger_name)
}

/// Check a standard five-field cron expression
pub fn validate_schedule(schedule: &str) -> Result<()> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    let [minute, hour, day_of_month, month, day_of_week] = fields[..] else {
        return Err(Error::invalid_spec(format!(
            "Invalid cron schedule '{}': expected 5 fields, found {}",
            schedule,
            fields.len()
        )));
    };
    // The cron crate wants seconds and years around the standard fields.
    let expression = format!(
        "0 {} {} {} {} {} *",
        minute,
        hour,
        day_of_month,
        month,
        crate_day_of_week(day_of_week)
    );
    Schedule::from_str(&expression)
        .map_err(|e| Error::invalid_spec(format!("Invalid cron schedule '{}': {}", schedule, e)))?;
    Ok(())
}

/// Renumber a standard day-of-week field (Sunday is 0 or 7) for the cron
/// crate, which counts Sunday as 1 and Saturday as 7
///
/// 7 is left alone so ranges ending in it stay ascending. Names, wildcards
/// and step sizes pass through unchanged.
fn crate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|item| {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (item, None),
            };
            let range = range
                .split('-')
                .map(|bound| match bound.parse::<u8>() {
                    Ok(day @ 0..=6) => (day + 1).to_string(),
                    _ => bound.to_string(),
                })
                .collect::<Vec<_>>()
                .join("-");
            match step {
                Some(step) => format!("{}/{}", range, step),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

impl Synthesizer {
    /// CronJob calling the function Service, owned by the trigger
    pub fn cron_job(&self, trigger: &CronJobTrigger, function: &Function) -> Result<CronJob> {
        validate_schedule(&trigger.spec.schedule)?;

        let timeout = function.spec.timeout_or_default();
        let deadline: i64 = timeout.parse().map_err(|_| {
            Error::invalid_spec(format!("Function timeout '{}' is not a number of seconds", timeout))
        })?;

        let function_name = function.name_any();
        let namespace = namespace_of(function)?;
        let url = format!(
            "http://{}.{}.svc.cluster.local:{}",
            function_name,
            namespace,
            service_port(function)
        );

        let mut args: Vec<String> = [
            "curl",
            "-Lv",
            "-H",
            "event-id: $(POD_NAME)",
            "-H",
            "event-type: application/json",
            "-H",
            "event-namespace: cronjobtrigger.kubeless.io",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if let Some(payload) = &trigger.spec.payload {
            args.push("-H".to_string());
            args.push("Content-Type: application/json".to_string());
            args.push("-d".to_string());
            args.push(serde_json::to_string(payload)?);
        }
        args.push(url);

        let labels = BTreeMap::from([
            ("created-by".to_string(), "kubeless".to_string()),
            ("function".to_string(), function_name),
        ]);

        Ok(CronJob {
            metadata: owned_meta(trigger, cron_job_name(&trigger.name_any()), labels)?,
            spec: Some(CronJobSpec {
                schedule: trigger.spec.schedule.clone(),
                successful_jobs_history_limit: Some(SUCCESSFUL_JOBS_HISTORY),
                failed_jobs_history_limit: Some(FAILED_JOBS_HISTORY),
                job_template: JobTemplateSpec {
                    metadata: None,
                    spec: Some(JobSpec {
                        active_deadline_seconds: Some(deadline),
                        template: PodTemplateSpec {
                            metadata: None,
                            spec: Some(PodSpec {
                                containers: vec![Container {
                                    name: "trigger".to_string(),
                                    image: Some(self.defaults.cronjob_image.clone()),
                                    args: Some(args),
                                    env: Some(vec![EnvVar {
                                        name: "POD_NAME".to_string(),
                                        value_from: Some(EnvVarSource {
                                            field_ref: Some(ObjectFieldSelector {
                                                field_path: "metadata.name".to_string(),
                                                ..Default::default()
                                            }),
                                            ..Default::default()
                                        }),
                                        ..Default::default()
                                    }]),
                                    ..Default::default()
                                }],
                                restart_policy: Some("Never".to_string()),
                                ..Default::default()
                            }),
                        },
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
