//! The simulations on offer and the three parameters each one is scored on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named scoring dimension with the keywords that move its fallback score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreParameter {
    pub name: &'static str,
    pub positive: &'static [&'static str],
    pub negative: &'static [&'static str],
}

const CRITICAL_THINKING: ScoreParameter = ScoreParameter {
    name: "Critical Thinking",
    positive: &["logical", "reasoned", "deduced", "questioned", "analyzed", "insightful", "sharp"],
    negative: &["illogical", "jumped to conclusions", "assumed", "overlooked", "confused", "careless"],
};

const COMMUNICATION: ScoreParameter = ScoreParameter {
    name: "Communication",
    positive: &["clear", "calm", "reassuring", "articulate", "transparent", "informed"],
    negative: &["unclear", "dismissive", "rude", "vague", "confusing", "silent"],
};

const DECISION_MAKING: ScoreParameter = ScoreParameter {
    name: "Decision Making",
    positive: &["decisive", "appropriate action", "escalated", "prioritized", "sound judgment", "timely"],
    negative: &["indecisive", "delayed", "ignored", "inappropriate", "hesitated", "poor judgment"],
};

const MURDER_MYSTERY: [ScoreParameter; 3] = [
    CRITICAL_THINKING,
    ScoreParameter {
        name: "Evidence Analysis",
        positive: &["evidence", "clue", "examined", "fingerprint", "alibi", "timeline", "motive"],
        negative: &["missed clue", "ignored evidence", "no evidence", "contaminated", "unexamined"],
    },
    ScoreParameter {
        name: "Intuition",
        positive: &["hunch", "instinct", "suspected", "noticed", "perceptive", "read the room"],
        negative: &["gullible", "fooled", "misread", "trusted the wrong", "oblivious"],
    },
];

const POSH: [ScoreParameter; 3] = [
    ScoreParameter {
        name: "Policy Knowledge",
        positive: &["policy", "internal committee", "complaint", "confidential", "posh act", "procedure"],
        negative: &["unaware", "no policy", "informal settlement", "breach", "non-compliant"],
    },
    ScoreParameter {
        name: "Empathy",
        positive: &["empathy", "listened", "supportive", "respectful", "acknowledged", "safe space"],
        negative: &["blamed", "victim-blaming", "insensitive", "dismissed", "mocked", "trivialized"],
    },
    DECISION_MAKING,
];

const HOSPITAL_CRISIS: [ScoreParameter; 3] = [
    ScoreParameter {
        name: "Crisis Management",
        positive: &["triage", "stabilized", "contained", "protocol", "coordinated", "contingency"],
        negative: &["panic", "chaos", "uncoordinated", "overwhelmed", "lost control"],
    },
    COMMUNICATION,
    ScoreParameter {
        name: "Resource Allocation",
        positive: &["allocated", "redeployed", "prioritized", "efficient", "staffed", "supplies"],
        negative: &["wasted", "shortage", "misallocated", "bottleneck", "understaffed"],
    },
];

const FINANCIAL_FRAUD: [ScoreParameter; 3] = [
    ScoreParameter {
        name: "Analytical Skills",
        positive: &["reconciled", "pattern", "analyzed", "traced", "anomaly", "cross-checked"],
        negative: &["missed pattern", "superficial", "misread", "overlooked", "guessed"],
    },
    ScoreParameter {
        name: "Attention to Detail",
        positive: &["detail", "discrepancy", "invoice", "ledger", "audit trail", "meticulous"],
        negative: &["sloppy", "careless", "skipped", "missed", "rushed"],
    },
    ScoreParameter {
        name: "Ethical Judgment",
        positive: &["reported", "whistleblower", "integrity", "compliance", "ethical", "disclosed"],
        negative: &["covered up", "bribe", "concealed", "unethical", "looked away"],
    },
];

const FAKE_NEWS: [ScoreParameter; 3] = [
    ScoreParameter {
        name: "Source Verification",
        positive: &["verified", "primary source", "cross-referenced", "fact-check", "credible", "reverse image"],
        negative: &["unverified", "anonymous source", "hearsay", "shared without", "rumor"],
    },
    CRITICAL_THINKING,
    ScoreParameter {
        name: "Media Literacy",
        positive: &["bias", "context", "headline", "satire", "manipulated", "deepfake"],
        negative: &["clickbait", "fell for", "misleading", "sensational", "spread"],
    },
];

const NEGOTIATION: [ScoreParameter; 3] = [
    ScoreParameter {
        name: "Persuasion",
        positive: &["convinced", "compelling", "leverage", "framed", "persuaded", "win-win"],
        negative: &["conceded", "caved", "weak argument", "unconvincing", "pushy"],
    },
    ScoreParameter {
        name: "Active Listening",
        positive: &["listened", "paraphrased", "clarified", "acknowledged", "understood", "asked"],
        negative: &["interrupted", "ignored", "talked over", "misunderstood", "dismissed"],
    },
    ScoreParameter {
        name: "Strategic Thinking",
        positive: &["batna", "anchored", "strategy", "trade-off", "long-term", "planned"],
        negative: &["short-sighted", "no plan", "reactive", "impulsive", "gave away"],
    },
];

const CYBER_INCIDENT: [ScoreParameter; 3] = [
    ScoreParameter {
        name: "Threat Detection",
        positive: &["detected", "indicator", "phishing", "malware", "anomaly", "logs"],
        negative: &["missed", "undetected", "clicked", "ignored alert", "blind spot"],
    },
    ScoreParameter {
        name: "Incident Response",
        positive: &["isolated", "contained", "patched", "escalated", "playbook", "restored"],
        negative: &["delayed", "paid the ransom", "spread", "uncontained", "no backup"],
    },
    COMMUNICATION,
];

const GENERAL: [ScoreParameter; 3] = [CRITICAL_THINKING, DECISION_MAKING, COMMUNICATION];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
    MurderMystery,
    #[serde(rename = "posh")]
    PoshTraining,
    HospitalCrisis,
    FinancialFraud,
    FakeNews,
    Negotiation,
    CyberIncident,
    General,
}

impl SimulationKind {
    pub const fn all() -> &'static [SimulationKind] {
        &[
            SimulationKind::MurderMystery,
            SimulationKind::PoshTraining,
            SimulationKind::HospitalCrisis,
            SimulationKind::FinancialFraud,
            SimulationKind::FakeNews,
            SimulationKind::Negotiation,
            SimulationKind::CyberIncident,
        ]
    }

    pub const fn tag(&self) -> &'static str {
        match self {
            SimulationKind::MurderMystery => "murder_mystery",
            SimulationKind::PoshTraining => "posh",
            SimulationKind::HospitalCrisis => "hospital_crisis",
            SimulationKind::FinancialFraud => "financial_fraud",
            SimulationKind::FakeNews => "fake_news",
            SimulationKind::Negotiation => "negotiation",
            SimulationKind::CyberIncident => "cyber_incident",
            SimulationKind::General => "general",
        }
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            SimulationKind::MurderMystery => "Murder Mystery",
            SimulationKind::PoshTraining => "POSH Workplace Training",
            SimulationKind::HospitalCrisis => "Hospital Crisis",
            SimulationKind::FinancialFraud => "Financial Fraud Investigation",
            SimulationKind::FakeNews => "Fake News Desk",
            SimulationKind::Negotiation => "High-Stakes Negotiation",
            SimulationKind::CyberIncident => "Cyber Incident Response",
            SimulationKind::General => "Training Simulation",
        }
    }

    /// Short brief used to frame every prompt for this simulation.
    pub const fn brief(&self) -> &'static str {
        match self {
            SimulationKind::MurderMystery => {
                "The player is a detective investigating a murder. They examine clues, interview suspects and finally accuse one suspect."
            }
            SimulationKind::PoshTraining => {
                "The player is an Internal Committee member handling a workplace sexual harassment complaint under India's POSH Act."
            }
            SimulationKind::HospitalCrisis => {
                "The player is the duty manager of a hospital during a mass-casualty emergency with limited staff and beds."
            }
            SimulationKind::FinancialFraud => {
                "The player is a forensic accountant investigating suspicious transactions inside a mid-size company."
            }
            SimulationKind::FakeNews => {
                "The player is a news desk editor deciding whether viral stories are genuine before publication."
            }
            SimulationKind::Negotiation => {
                "The player negotiates a contract renewal with a difficult counterpart who holds significant leverage."
            }
            SimulationKind::CyberIncident => {
                "The player leads the response to a suspected ransomware intrusion at a logistics company."
            }
            SimulationKind::General => {
                "The player works through a realistic workplace scenario that demands judgment under pressure."
            }
        }
    }

    pub const fn parameters(&self) -> &'static [ScoreParameter; 3] {
        match self {
            SimulationKind::MurderMystery => &MURDER_MYSTERY,
            SimulationKind::PoshTraining => &POSH,
            SimulationKind::HospitalCrisis => &HOSPITAL_CRISIS,
            SimulationKind::FinancialFraud => &FINANCIAL_FRAUD,
            SimulationKind::FakeNews => &FAKE_NEWS,
            SimulationKind::Negotiation => &NEGOTIATION,
            SimulationKind::CyberIncident => &CYBER_INCIDENT,
            SimulationKind::General => &GENERAL,
        }
    }

    /// Whether the scenario is a whodunit with suspects and an accusation.
    pub const fn is_detective(&self) -> bool {
        matches!(
            self,
            SimulationKind::MurderMystery | SimulationKind::FinancialFraud
        )
    }

    /// Lenient lookup used for free-form tags; unknown tags map to `General`.
    pub fn from_tag(tag: &str) -> SimulationKind {
        tag.parse().unwrap_or(SimulationKind::General)
    }
}

impl fmt::Display for SimulationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SimulationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "murder_mystery" | "murder" | "detective" | "mystery" => Ok(SimulationKind::MurderMystery),
            "posh" | "posh_training" | "harassment" => Ok(SimulationKind::PoshTraining),
            "hospital_crisis" | "hospital" | "crisis" => Ok(SimulationKind::HospitalCrisis),
            "financial_fraud" | "fraud" | "forensic_accounting" => Ok(SimulationKind::FinancialFraud),
            "fake_news" | "misinformation" | "news" => Ok(SimulationKind::FakeNews),
            "negotiation" => Ok(SimulationKind::Negotiation),
            "cyber_incident" | "cyber" | "ransomware" => Ok(SimulationKind::CyberIncident),
            "general" => Ok(SimulationKind::General),
            _ => Err(format!("unknown simulation type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// How many suspects a generated whodunit should contain.
    pub const fn suspect_count(&self) -> usize {
        match self {
            Difficulty::Easy => 3,
            Difficulty::Medium => 4,
            Difficulty::Hard => 5,
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" | "normal" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!("unknown difficulty: {s}")),
        }
    }
}

/// Catalog entry shown in the simulation picker.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub kind: SimulationKind,
    pub name: &'static str,
    pub brief: &'static str,
    pub parameters: Vec<&'static str>,
}

pub fn catalog_entries() -> Vec<CatalogEntry> {
    SimulationKind::all()
        .iter()
        .map(|kind| CatalogEntry {
            kind: *kind,
            name: kind.display_name(),
            brief: kind.brief(),
            parameters: kind.parameters().iter().map(|p| p.name).collect(),
        })
        .collect()
}
