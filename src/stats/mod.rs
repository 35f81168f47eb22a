// src/stats/mod.rs

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::normalize::Gender;
use crate::schema::{resolve, resolve_text, MemberField};
use crate::store::Row;

/// How many level buckets the summary keeps.
pub const TOP_LEVELS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AgeBracket {
    UpTo12,
    From13To15,
    From16To18,
    From19To25,
    From26,
}

impl AgeBracket {
    pub const ALL: [AgeBracket; 5] = [
        AgeBracket::UpTo12,
        AgeBracket::From13To15,
        AgeBracket::From16To18,
        AgeBracket::From19To25,
        AgeBracket::From26,
    ];

    /// Brackets are whole years, so `12.5` counts as 12. `None` for non-finite
    /// or non-positive ages.
    pub fn for_age(age: f64) -> Option<Self> {
        if !age.is_finite() || age <= 0.0 {
            return None;
        }
        let age = age.trunc();
        Some(if age <= 12.0 {
            AgeBracket::UpTo12
        } else if age <= 15.0 {
            AgeBracket::From13To15
        } else if age <= 18.0 {
            AgeBracket::From16To18
        } else if age <= 25.0 {
            AgeBracket::From19To25
        } else {
            AgeBracket::From26
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBracket::UpTo12 => "12 and under",
            AgeBracket::From13To15 => "13-15",
            AgeBracket::From16To18 => "16-18",
            AgeBracket::From19To25 => "19-25",
            AgeBracket::From26 => "26+",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Headline numbers for one row set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemberStats {
    pub total: usize,
    pub males: usize,
    pub females: usize,
    /// Indexed like `AgeBracket::ALL`.
    pub ages: [usize; 5],
    /// Most common levels first, at most `TOP_LEVELS`.
    pub levels: Vec<(String, usize)>,
}

impl MemberStats {
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut stats = MemberStats {
            total: rows.len(),
            ..Default::default()
        };

        // first-seen order, so the stable sort below keeps ties in that order
        let mut levels: Vec<(String, usize)> = Vec::new();
        let mut level_index: HashMap<String, usize> = HashMap::new();

        for row in rows {
            match Gender::parse(&resolve_text(row, MemberField::Gender.label())) {
                Some(Gender::Male) => stats.males += 1,
                Some(Gender::Female) => stats.females += 1,
                None => {}
            }

            if let Some(bracket) = resolve(row, MemberField::Age.label())
                .and_then(parse_age)
                .and_then(AgeBracket::for_age)
            {
                stats.ages[bracket.index()] += 1;
            }

            let level = resolve_text(row, MemberField::Level.label());
            if !level.is_empty() {
                match level_index.get(&level) {
                    Some(&i) => levels[i].1 += 1,
                    None => {
                        level_index.insert(level.clone(), levels.len());
                        levels.push((level, 1));
                    }
                }
            }
        }

        levels.sort_by(|a, b| b.1.cmp(&a.1));
        levels.truncate(TOP_LEVELS);
        stats.levels = levels;
        stats
    }

    pub fn age_count(&self, bracket: AgeBracket) -> usize {
        self.ages[bracket.index()]
    }

    /// Plain-text summary block written above the CSV header.
    pub fn summary_lines(&self, title: &str) -> Vec<String> {
        let mut lines = vec![
            title.to_string(),
            format!("Total Members: {}", self.total),
            format!("Males: {}", self.males),
            format!("Females: {}", self.females),
        ];
        for bracket in AgeBracket::ALL {
            lines.push(format!("Age {}: {}", bracket.label(), self.age_count(bracket)));
        }
        for (level, count) in &self.levels {
            lines.push(format!("Level {}: {}", level, count));
        }
        lines
    }
}

fn parse_age(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
