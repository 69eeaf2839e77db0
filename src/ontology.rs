//! Ontology: domains, subdomains, evaluation dimensions, and expertise
//! bands, loaded once and handed to each processing run as an immutable
//! snapshot. All entries are validated at load time so malformed records
//! fail fast instead of producing garbage prompts downstream.

use crate::error::{ReviewError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subdomain {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub subdomains: BTreeMap<String, Subdomain>,
    pub relevant_dimensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Meaning of each scale point, indexed 1..=5.
    pub scale: BTreeMap<u8, String>,
}

impl Dimension {
    pub const SCALE_MIN: f64 = 1.0;
    pub const SCALE_MAX: f64 = 5.0;
    pub const SCALE_MIDPOINT: f64 = 3.0;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertiseLevel {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Inclusive confidence band; bands partition 0..=100.
    pub confidence_range: (u8, u8),
}

/// Immutable view of the ontology for one processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologySnapshot {
    domains: BTreeMap<String, Domain>,
    dimensions: BTreeMap<String, Dimension>,
    expertise_levels: Vec<ExpertiseLevel>,
}

impl OntologySnapshot {
    pub fn new(
        domains: Vec<Domain>,
        dimensions: Vec<Dimension>,
        expertise_levels: Vec<ExpertiseLevel>,
    ) -> Result<Self> {
        let snapshot = Self {
            domains: domains.into_iter().map(|d| (d.id.clone(), d)).collect(),
            dimensions: dimensions.into_iter().map(|d| (d.id.clone(), d)).collect(),
            expertise_levels,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReviewError::OntologyUnavailable(format!("{}: {}", path.display(), e)))?;
        let mut snapshot: OntologySnapshot = serde_json::from_str(&content)
            .map_err(|e| ReviewError::OntologyUnavailable(format!("{}: {}", path.display(), e)))?;
        snapshot.normalize();
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Lower-case keyword bags so matching never depends on input casing.
    fn normalize(&mut self) {
        for domain in self.domains.values_mut() {
            for kw in &mut domain.keywords {
                *kw = kw.to_lowercase();
            }
            for sub in domain.subdomains.values_mut() {
                for kw in &mut sub.keywords {
                    *kw = kw.to_lowercase();
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.domains.is_empty() {
            return Err(ReviewError::OntologyUnavailable("no domains defined".to_string()));
        }
        for domain in self.domains.values() {
            if domain.keywords.is_empty() {
                return Err(ReviewError::OntologyUnavailable(format!(
                    "domain '{}' has no keywords",
                    domain.id
                )));
            }
            if domain.relevant_dimensions.is_empty() {
                return Err(ReviewError::OntologyUnavailable(format!(
                    "domain '{}' has no relevant dimensions",
                    domain.id
                )));
            }
            for dim_id in &domain.relevant_dimensions {
                if !self.dimensions.contains_key(dim_id) {
                    return Err(ReviewError::OntologyUnavailable(format!(
                        "domain '{}' references unknown dimension '{}'",
                        domain.id, dim_id
                    )));
                }
            }
            for (sub_id, sub) in &domain.subdomains {
                if sub.keywords.is_empty() {
                    return Err(ReviewError::OntologyUnavailable(format!(
                        "subdomain '{}/{}' has no keywords",
                        domain.id, sub_id
                    )));
                }
            }
        }
        for dimension in self.dimensions.values() {
            for point in 1..=5u8 {
                if !dimension.scale.contains_key(&point) {
                    return Err(ReviewError::OntologyUnavailable(format!(
                        "dimension '{}' missing scale point {}",
                        dimension.id, point
                    )));
                }
            }
        }
        self.validate_bands()
    }

    /// Expertise bands must partition 0..=100 with no gaps or overlaps.
    fn validate_bands(&self) -> Result<()> {
        if self.expertise_levels.is_empty() {
            return Err(ReviewError::OntologyUnavailable(
                "no expertise levels defined".to_string(),
            ));
        }
        let mut bands: Vec<&ExpertiseLevel> = self.expertise_levels.iter().collect();
        bands.sort_by_key(|l| l.confidence_range.0);
        let mut expected = 0u16;
        for level in &bands {
            let (lo, hi) = level.confidence_range;
            if u16::from(lo) != expected || hi < lo {
                return Err(ReviewError::OntologyUnavailable(format!(
                    "expertise band '{}' ({}-{}) leaves a gap or overlap",
                    level.id, lo, hi
                )));
            }
            expected = u16::from(hi) + 1;
        }
        if expected != 101 {
            return Err(ReviewError::OntologyUnavailable(
                "expertise bands do not cover 0-100".to_string(),
            ));
        }
        Ok(())
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.values()
    }

    pub fn domain_ids(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    pub fn domain(&self, id: &str) -> Option<&Domain> {
        self.domains.get(id)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    pub fn dimension(&self, id: &str) -> Option<&Dimension> {
        self.dimensions.get(id)
    }

    pub fn expertise_levels(&self) -> &[ExpertiseLevel] {
        &self.expertise_levels
    }

    pub fn relevant_dimensions(&self, domain_id: &str) -> Vec<&Dimension> {
        self.domain(domain_id)
            .map(|d| {
                d.relevant_dimensions
                    .iter()
                    .filter_map(|id| self.dimensions.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Band lookup for a validated 0-100 confidence score.
    pub fn expertise_level_for(&self, confidence_score: u8) -> &ExpertiseLevel {
        self.expertise_levels
            .iter()
            .find(|l| l.confidence_range.0 <= confidence_score && confidence_score <= l.confidence_range.1)
            .unwrap_or(&self.expertise_levels[0])
    }

    /// Seed ontology covering the six launch domains and six evaluation
    /// dimensions. Deployments normally load an edited JSON file instead.
    pub fn builtin() -> Self {
        let domains = builtin_domains();
        let dimensions = builtin_dimensions();
        let expertise_levels = builtin_expertise_levels();
        // The builtin data always validates.
        Self::new(domains, dimensions, expertise_levels)
            .unwrap_or_else(|e| panic!("builtin ontology invalid: {}", e))
    }
}

/// Shared, read-mostly ontology handle. Each processing run takes a
/// `snapshot()` at start; `reload()` and the add operations swap in a new
/// validated snapshot without disturbing in-flight runs.
pub struct OntologyStore {
    current: RwLock<Arc<OntologySnapshot>>,
    path: Option<std::path::PathBuf>,
}

impl OntologyStore {
    pub fn new(snapshot: OntologySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            path: None,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let snapshot = OntologySnapshot::load(path)?;
        info!(
            "Loaded ontology from {} ({} domains, {} dimensions)",
            path.display(),
            snapshot.domain_ids().len(),
            snapshot.dimensions().count()
        );
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn snapshot(&self) -> Arc<OntologySnapshot> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }

    /// Re-read the backing file, if any. No-op for in-memory ontologies.
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = OntologySnapshot::load(path)?;
        self.swap(snapshot);
        info!("Ontology reloaded from {}", path.display());
        Ok(())
    }

    /// Incrementally add a domain without restarting the process.
    pub fn add_domain(&self, domain: Domain) -> Result<()> {
        let mut next = (*self.snapshot()).clone();
        next.domains.insert(domain.id.clone(), domain);
        next.normalize();
        next.validate()?;
        self.swap(next);
        Ok(())
    }

    /// Incrementally add a dimension without restarting the process.
    pub fn add_dimension(&self, dimension: Dimension) -> Result<()> {
        let mut next = (*self.snapshot()).clone();
        next.dimensions.insert(dimension.id.clone(), dimension);
        next.validate()?;
        self.swap(next);
        Ok(())
    }

    fn swap(&self, snapshot: OntologySnapshot) {
        match self.current.write() {
            Ok(mut guard) => *guard = Arc::new(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(snapshot),
        }
    }
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}

fn subdomain(name: &str, kws: &[&str]) -> Subdomain {
    Subdomain {
        name: name.to_string(),
        keywords: keywords(kws),
    }
}

fn builtin_domains() -> Vec<Domain> {
    vec![
        Domain {
            id: "technical".to_string(),
            name: "Technical".to_string(),
            description: "Expertise in programming, software engineering, hardware development, or technical implementation".to_string(),
            keywords: keywords(&["programming", "software", "hardware", "development", "engineering", "technical", "code", "architecture"]),
            subdomains: BTreeMap::from([
                ("frontend".to_string(), subdomain("Frontend Development", &["ui", "ux", "web", "mobile", "frontend"])),
                ("backend".to_string(), subdomain("Backend Development", &["server", "database", "api", "backend"])),
                ("data_science".to_string(), subdomain("Data Science", &["machine learning", "ai", "data", "analytics", "model"])),
                ("devops".to_string(), subdomain("DevOps", &["deployment", "infrastructure", "cloud", "ci/cd"])),
            ]),
            relevant_dimensions: vec![
                "technical_feasibility".to_string(),
                "implementation_complexity".to_string(),
                "scalability".to_string(),
                "innovation".to_string(),
            ],
        },
        Domain {
            id: "clinical".to_string(),
            name: "Clinical".to_string(),
            description: "Medical or healthcare expertise related to patient care, diagnosis, or treatment".to_string(),
            keywords: keywords(&["medical", "healthcare", "clinical", "patient", "diagnosis", "treatment", "doctor", "nurse"]),
            subdomains: BTreeMap::from([
                ("primary_care".to_string(), subdomain("Primary Care", &["general practice", "family medicine"])),
                ("specialty".to_string(), subdomain("Medical Specialties", &["cardiology", "neurology", "oncology"])),
                ("nursing".to_string(), subdomain("Nursing", &["nurse", "patient care", "bedside"])),
                ("emergency".to_string(), subdomain("Emergency Medicine", &["emergency", "urgent care", "trauma"])),
            ]),
            relevant_dimensions: vec![
                "impact".to_string(),
                "implementation_complexity".to_string(),
                "technical_feasibility".to_string(),
            ],
        },
        Domain {
            id: "administrative".to_string(),
            name: "Administrative".to_string(),
            description: "Expertise in healthcare administration, policy, and management".to_string(),
            keywords: keywords(&["administration", "management", "policy", "governance", "operations", "compliance"]),
            subdomains: BTreeMap::from([
                ("hospital_admin".to_string(), subdomain("Hospital Administration", &["hospital", "facility", "operations"])),
                ("health_policy".to_string(), subdomain("Health Policy", &["policy", "regulation", "compliance"])),
                ("operations".to_string(), subdomain("Healthcare Operations", &["workflow", "process", "efficiency"])),
            ]),
            relevant_dimensions: vec![
                "implementation_complexity".to_string(),
                "scalability".to_string(),
                "return_on_investment".to_string(),
            ],
        },
        Domain {
            id: "business".to_string(),
            name: "Business".to_string(),
            description: "Expertise in business models, market analysis, and commercialization".to_string(),
            keywords: keywords(&["business", "market", "commercialization", "monetization", "startup", "entrepreneur", "revenue"]),
            subdomains: BTreeMap::from([
                ("strategy".to_string(), subdomain("Business Strategy", &["strategy", "planning", "vision"])),
                ("finance".to_string(), subdomain("Finance", &["funding", "investment", "revenue", "cost"])),
                ("marketing".to_string(), subdomain("Marketing", &["marketing", "branding", "growth"])),
                ("entrepreneurship".to_string(), subdomain("Entrepreneurship", &["startup", "venture", "founding"])),
            ]),
            relevant_dimensions: vec![
                "return_on_investment".to_string(),
                "scalability".to_string(),
                "impact".to_string(),
            ],
        },
        Domain {
            id: "design".to_string(),
            name: "Design".to_string(),
            description: "Expertise in user interface, user experience, and visual design".to_string(),
            keywords: keywords(&["design", "ui", "ux", "visual", "graphic", "user interface", "user experience"]),
            subdomains: BTreeMap::from([
                ("ui_design".to_string(), subdomain("UI Design", &["interface", "visual", "graphic"])),
                ("ux_design".to_string(), subdomain("UX Design", &["experience", "interaction", "usability", "accessibility"])),
                ("service_design".to_string(), subdomain("Service Design", &["service", "journey", "touchpoint"])),
            ]),
            relevant_dimensions: vec![
                "innovation".to_string(),
                "impact".to_string(),
                "implementation_complexity".to_string(),
            ],
        },
        Domain {
            id: "user_experience".to_string(),
            name: "User Experience".to_string(),
            description: "Expertise in how users interact with products and services".to_string(),
            keywords: keywords(&["user", "experience", "usability", "user testing", "user research", "human-computer interaction"]),
            subdomains: BTreeMap::from([
                ("user_research".to_string(), subdomain("User Research", &["research", "interviews", "surveys", "testing"])),
                ("accessibility".to_string(), subdomain("Accessibility", &["accessible", "inclusion", "disability"])),
                ("behavior".to_string(), subdomain("User Behavior", &["behavior", "psychology", "cognitive"])),
            ]),
            relevant_dimensions: vec![
                "impact".to_string(),
                "implementation_complexity".to_string(),
                "innovation".to_string(),
            ],
        },
    ]
}

fn scale(points: [&str; 5]) -> BTreeMap<u8, String> {
    points
        .iter()
        .enumerate()
        .map(|(i, text)| (i as u8 + 1, text.to_string()))
        .collect()
}

fn builtin_dimensions() -> Vec<Dimension> {
    vec![
        Dimension {
            id: "technical_feasibility".to_string(),
            name: "Technical Feasibility".to_string(),
            description: "How technically feasible is the project to implement".to_string(),
            scale: scale([
                "Extremely difficult or impossible with current technology",
                "Substantial technical challenges",
                "Moderate technical challenges",
                "Few technical challenges",
                "Easily implementable with existing technology",
            ]),
        },
        Dimension {
            id: "innovation".to_string(),
            name: "Innovation".to_string(),
            description: "How innovative or novel is the approach".to_string(),
            scale: scale([
                "Not innovative, duplicates existing solutions",
                "Minor improvements to existing approaches",
                "Moderate innovation with some novel aspects",
                "Significantly innovative approach",
                "Groundbreaking, completely novel approach",
            ]),
        },
        Dimension {
            id: "impact".to_string(),
            name: "Impact".to_string(),
            description: "Potential impact on the target problem or domain".to_string(),
            scale: scale([
                "Minimal or no impact",
                "Limited impact",
                "Moderate impact",
                "Significant impact",
                "Transformative impact",
            ]),
        },
        Dimension {
            id: "implementation_complexity".to_string(),
            name: "Implementation Complexity".to_string(),
            description: "Complexity of implementing the solution in practice".to_string(),
            scale: scale([
                "Extremely complex implementation",
                "Highly complex implementation",
                "Moderately complex implementation",
                "Relatively simple implementation",
                "Very straightforward implementation",
            ]),
        },
        Dimension {
            id: "scalability".to_string(),
            name: "Scalability".to_string(),
            description: "Ability to scale to wider implementation".to_string(),
            scale: scale([
                "Not scalable beyond initial context",
                "Limited scalability",
                "Moderately scalable",
                "Highly scalable",
                "Extremely scalable with minimal effort",
            ]),
        },
        Dimension {
            id: "return_on_investment".to_string(),
            name: "Return on Investment".to_string(),
            description: "Expected return relative to investment required".to_string(),
            scale: scale([
                "Poor ROI, costs greatly exceed benefits",
                "Limited ROI, costs somewhat exceed benefits",
                "Moderate ROI, benefits roughly equal costs",
                "Good ROI, benefits exceed costs",
                "Excellent ROI, benefits greatly exceed costs",
            ]),
        },
    ]
}

fn builtin_expertise_levels() -> Vec<ExpertiseLevel> {
    vec![
        ExpertiseLevel {
            id: "beginner".to_string(),
            name: "Beginner".to_string(),
            description: "Basic understanding of the domain".to_string(),
            confidence_range: (0, 40),
        },
        ExpertiseLevel {
            id: "skilled".to_string(),
            name: "Skilled".to_string(),
            description: "Practical experience and good understanding of the domain".to_string(),
            confidence_range: (41, 70),
        },
        ExpertiseLevel {
            id: "talented".to_string(),
            name: "Talented".to_string(),
            description: "Deep understanding and significant experience in the domain".to_string(),
            confidence_range: (71, 85),
        },
        ExpertiseLevel {
            id: "seasoned".to_string(),
            name: "Seasoned".to_string(),
            description: "Extensive experience and comprehensive knowledge of the domain".to_string(),
            confidence_range: (86, 95),
        },
        ExpertiseLevel {
            id: "expert".to_string(),
            name: "Expert".to_string(),
            description: "Top-level expertise with mastery of the domain".to_string(),
            confidence_range: (96, 100),
        },
    ]
}
