use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Phase 1 ranking weights. Lower score = picked first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityWeights {
    /// Per day already worked this month.
    pub assigned_days: f64,
    /// Per unit of (month-to-date dimension count - cumulative deviation).
    pub imbalance: f64,
    /// Per day of the current consecutive work run.
    pub consecutive_days: f64,
    /// Added once the run would reach `max_consecutive_days`.
    pub consecutive_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Weekly work days used for the Phase 2 OFF target and as the
    /// personal target of staff without one.
    pub default_work_days: u32,
    pub max_consecutive_days: u32,
    /// Run lock lifetime; a crashed run's lock can be taken over after this.
    pub lock_ttl_seconds: i64,
    /// Upper bound on fixes applied by one validation pass.
    pub max_auto_fixes: usize,
    pub tie_break_seed: u64,
    pub priority: PriorityWeights,
}

#[derive(Debug, Clone, Deserialize)]
struct EngineConfigFile {
    engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryRatioFile {
    /// department -> category -> percentage of the department's working staff
    departments: HashMap<String, HashMap<String, f64>>,
}

#[derive(Debug, Clone)]
pub struct RotaConfig {
    pub engine: EngineConfig,
    pub category_ratios: HashMap<String, HashMap<String, f64>>,
}

impl RotaConfig {
    /// Load from the data/ directory.
    /// In tests, use RotaConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let engine_path = format!("{data_dir}/rota/engine_config.json");
        let engine_content = std::fs::read_to_string(&engine_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {engine_path}: {e}"))?;
        let engine_file: EngineConfigFile = serde_json::from_str(&engine_content)?;

        let ratio_path = format!("{data_dir}/rota/category_ratios.json");
        let ratio_content = std::fs::read_to_string(&ratio_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {ratio_path}: {e}"))?;
        let ratio_file: CategoryRatioFile = serde_json::from_str(&ratio_content)?;

        for (dept, cats) in &ratio_file.departments {
            let sum: f64 = cats.values().sum();
            if sum > 100.0 + 1e-6 {
                anyhow::bail!("category ratios for '{dept}' add up to {sum:.1}% (> 100%)");
            }
        }

        Ok(Self {
            engine: engine_file.engine,
            category_ratios: ratio_file.departments,
        })
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            engine: EngineConfig {
                default_work_days: 4,
                max_consecutive_days: 5,
                lock_ttl_seconds: 600,
                max_auto_fixes: 100,
                tie_break_seed: 0x5EED_CAFE,
                priority: PriorityWeights {
                    assigned_days: 1.0,
                    imbalance: 0.5,
                    consecutive_days: 0.25,
                    consecutive_penalty: 100.0,
                },
            },
            category_ratios: HashMap::new(),
        }
    }

    /// Ratio (0.0..=1.0) a category should hold within its department's working staff.
    pub fn category_ratio(&self, department: &str, category: &str) -> Option<f64> {
        self.category_ratios
            .get(department)
            .and_then(|cats| cats.get(category))
            .map(|pct| pct / 100.0)
    }
}
