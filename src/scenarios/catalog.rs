//! Built-in scenarios.
//!
//! Each plants facts early, pads the conversation so compaction fires, then
//! asks for the facts back in the last turn.

use super::{Scenario, ScenarioRun};

fn block(lines: &[&str]) -> String {
    lines.join("\n")
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn nexus_brief(verbose: bool) -> Vec<String> {
    if verbose {
        vec![
            block(&[
                "I need you to remember this CRITICAL information for our project:",
                "- Project Code: NEXUS-7749",
                "- Budget: $2.4 million",
                "- Lead Architect: Dr. Sarah Chen",
                "- Deadline: November 30th, 2025",
                "Please confirm you have noted all these details.",
            ]),
            "Explain the concept of microservices architecture and its benefits over monolithic systems.".into(),
            "What are the best practices for API versioning in REST services?".into(),
            block(&[
                "Additional project details:",
                "- Database: PostgreSQL 15 with TimescaleDB extension",
                "- Cloud Provider: AWS us-west-2 region",
                "- CI/CD: GitHub Actions with ArgoCD",
                "Please acknowledge.",
            ]),
            "Describe the differences between SQL and NoSQL databases with examples.".into(),
            "What is the CAP theorem and how does it apply to distributed systems?".into(),
            block(&[
                "Security requirements update:",
                "- Authentication: OAuth 2.0 with PKCE",
                "- Encryption: AES-256 at rest, TLS 1.3 in transit",
                "- Compliance: SOC 2 Type II required",
                "Got it?",
            ]),
            "Explain containerization with Docker and when to use Kubernetes.".into(),
            "What are the principles of twelve-factor app methodology?".into(),
            block(&[
                "IMPORTANT: I need you to recall the ORIGINAL project details from the",
                "very beginning of our conversation:",
                "1. What was the Project Code?",
                "2. What was the Budget?",
                "3. Who was the Lead Architect?",
                "4. What was the Deadline?",
                "",
                "These were the FIRST things I told you. Please list them all.",
            ]),
        ]
    } else {
        vec![
            block(&[
                "CRITICAL project information to remember:",
                "- Project Code: NEXUS-7749",
                "- Budget: $2.4 million",
                "- Lead Architect: Dr. Sarah Chen",
                "- Deadline: November 30th, 2025",
                "Please confirm.",
            ]),
            "Explain microservices architecture briefly.".into(),
            "What are REST API versioning best practices?".into(),
            block(&[
                "More details:",
                "- Database: PostgreSQL 15",
                "- Cloud: AWS us-west-2",
                "- CI/CD: GitHub Actions",
                "Noted?",
            ]),
            "Explain SQL vs NoSQL differences.".into(),
            "What is the CAP theorem?".into(),
            block(&[
                "Security requirements:",
                "- Auth: OAuth 2.0 with PKCE",
                "- Encryption: AES-256",
                "- Compliance: SOC 2 Type II",
                "Got it?",
            ]),
            "Explain Docker containerization.".into(),
            "What is twelve-factor app methodology?".into(),
            block(&[
                "RECALL TEST: What were the ORIGINAL project details from Turn 1?",
                "- Project Code?",
                "- Budget?",
                "- Lead Architect?",
                "- Deadline?",
            ]),
        ]
    }
}

const NEXUS_MARKERS: &[&str] = &["NEXUS-7749", "2.4 million", "Sarah Chen", "November 30"];

/// The seven built-in scenarios, in menu order.
pub fn builtin() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "Basic Memory Retention".into(),
            description: "Personal facts over five turns, then a request to list them.".into(),
            messages: owned(&[
                "Hi! My name is Alice and I'm a software engineer.",
                "I live in San Francisco and I love hiking on weekends.",
                "My favorite programming language is Python and my favorite color is blue.",
                "I have a cat named Whiskers who is 3 years old.",
                "What do you remember about me? Please list everything you know.",
            ]),
            runs: vec![ScenarioRun::new("interval=3", 3, 1)],
            recall_markers: owned(&["Alice", "San Francisco", "Python", "Whiskers"]),
            track_tokens: false,
        },
        Scenario {
            name: "Context Filling and Compaction".into(),
            description: "A secret code, three long stories as filler, then recall of the code."
                .into(),
            messages: owned(&[
                "Important: The secret access code is 'ALPHA-7392'. Please acknowledge.",
                "Tell me a long story about a robot learning to paint.",
                "Now tell me another long story about a space explorer.",
                "Tell me a third story about an underwater civilization.",
                "What was the secret access code I told you at the beginning?",
            ]),
            runs: vec![ScenarioRun::new("interval=2", 2, 1)],
            recall_markers: owned(&["ALPHA-7392"]),
            track_tokens: false,
        },
        Scenario {
            name: "Multiple Facts Extended Test".into(),
            description: "Facts spread over ten turns so several compaction cycles occur.".into(),
            messages: owned(&[
                "Let me tell you about myself. My employee ID is EMP-98765.",
                "I work in the Engineering department on the 5th floor.",
                "My manager's name is Bob Smith and our team has 8 members.",
                "What's 25 times 17? Just curious.",
                "Oh, and my work phone extension is 4321.",
                "Our project codename is 'Phoenix' and deadline is March 15th.",
                "Can you explain what recursion is in programming?",
                "My emergency contact is my sister Jane at 555-1234.",
                "Now please tell me: What is my employee ID, what floor do I work on, and what is my project codename?",
                "Also, what is my manager's name and my phone extension?",
            ]),
            runs: vec![ScenarioRun::new("interval=3", 3, 1)],
            recall_markers: owned(&["Bob Smith", "4321"]),
            track_tokens: false,
        },
        Scenario {
            name: "Compare Compaction Intervals".into(),
            description: "The same conversation with aggressive (2) and relaxed (5) intervals."
                .into(),
            messages: owned(&[
                "Critical info: My password hint is 'blue-ocean-42'. Please confirm.",
                "Tell me about the history of the internet in a few sentences.",
                "What are the main principles of object-oriented programming?",
                "Explain the difference between TCP and UDP briefly.",
                "What was my password hint that I told you earlier?",
            ]),
            runs: vec![
                ScenarioRun::new("aggressive (interval=2)", 2, 1),
                ScenarioRun::new("relaxed (interval=5)", 5, 1),
            ],
            recall_markers: owned(&["blue-ocean-42"]),
            track_tokens: false,
        },
        Scenario {
            name: "Compaction Chain Survival".into(),
            description: "Turn 1 facts must survive three compactions through the summary chain."
                .into(),
            messages: nexus_brief(true),
            runs: vec![ScenarioRun::new("interval=3", 3, 1)],
            recall_markers: owned(NEXUS_MARKERS),
            track_tokens: false,
        },
        Scenario {
            name: "WITH vs WITHOUT Compaction".into(),
            description: "The same ten turns with compaction that never fires (100) and with interval 3."
                .into(),
            messages: nexus_brief(false),
            runs: vec![
                ScenarioRun::new("without compaction (interval=100)", 100, 1),
                ScenarioRun::new("with compaction (interval=3)", 3, 1),
            ],
            recall_markers: owned(NEXUS_MARKERS),
            track_tokens: false,
        },
        Scenario {
            name: "Long Conversation + Token Tracking".into(),
            description: "Ten turns twice: interval 8 lets prompt tokens grow for most of the run, interval 3 keeps them flat."
                .into(),
            messages: vec![
                block(&[
                    "REMEMBER THIS - Project Alpha Details:",
                    "- Code: ZETA-9988",
                    "- Budget: $5.7 million",
                    "- Director: Dr. James Wilson",
                    "- Launch Date: September 15th, 2026",
                    "- Location: Building 7, Floor 12",
                    "Please confirm all details.",
                ]),
                "Explain the principles of machine learning in detail.".into(),
                "What is the difference between supervised and unsupervised learning?".into(),
                "Describe how neural networks work with examples.".into(),
                "Explain microservices architecture and its benefits.".into(),
                "What is containerization and how does Docker work?".into(),
                "Describe the CI/CD pipeline and its importance.".into(),
                "What are design patterns in software engineering?".into(),
                "Explain RESTful API design principles.".into(),
                block(&[
                    "CRITICAL RECALL TEST:",
                    "What were the Project Alpha details I told you at the VERY BEGINNING?",
                    "- What was the Code?",
                    "- What was the Budget?",
                    "- Who was the Director?",
                    "- What was the Launch Date?",
                    "- What was the Location?",
                    "List ALL five details.",
                ]),
            ],
            runs: vec![
                ScenarioRun::new("relaxed (interval=8)", 8, 1),
                ScenarioRun::new("compaction at turns 3, 6, 9 (interval=3)", 3, 1),
            ],
            recall_markers: owned(&[
                "ZETA-9988",
                "5.7 million",
                "James Wilson",
                "September 15",
                "Building 7",
            ]),
            track_tokens: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seven_valid_scenarios() {
        let scenarios = builtin();
        assert_eq!(scenarios.len(), 7);
        for s in &scenarios {
            s.validate().unwrap();
        }
    }

    #[test]
    fn test_recall_markers_planted_before_final_turn() {
        for s in builtin() {
            let (_, earlier) = s.messages.split_last().unwrap();
            for marker in &s.recall_markers {
                assert!(
                    earlier.iter().any(|m| m.contains(marker.as_str())),
                    "{}: {marker}",
                    s.name
                );
            }
        }
    }

    #[test]
    fn test_comparison_scenarios() {
        let scenarios = builtin();
        let comparing: Vec<&str> = scenarios
            .iter()
            .filter(|s| s.compares_runs())
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            comparing,
            vec![
                "Compare Compaction Intervals",
                "WITH vs WITHOUT Compaction",
                "Long Conversation + Token Tracking",
            ]
        );
    }

    #[test]
    fn test_without_compaction_baseline_never_fires() {
        let s = &builtin()[5];
        assert!(!s.runs[0].config.compacts_within(s.messages.len()));
        assert!(s.runs[1].config.compacts_within(s.messages.len()));
    }

    #[test]
    fn test_ten_turn_scenarios() {
        let scenarios = builtin();
        for i in [2, 4, 5, 6] {
            assert_eq!(scenarios[i].messages.len(), 10, "{}", scenarios[i].name);
        }
    }
}
