//! Canned replies used when no completion service is engaged.
//!
//! Rules are evaluated top to bottom and the first matching predicate wins,
//! so a query mentioning both the library and a study schedule gets the
//! library text.

pub const LIBRARY_HOURS: &str = "The library is open:\n\
• Monday-Friday: 7:00 AM - 11:00 PM\n\
• Saturday: 9:00 AM - 9:00 PM\n\
• Sunday: 10:00 AM - 10:00 PM\n\n\
During finals week, we extend hours to 24/7!";

pub const STUDY_SCHEDULE: &str = "Here's a personalized study schedule template:\n\n\
**Week before finals:**\n\
• Day 1-2: Review all course materials\n\
• Day 3-4: Create summary notes\n\
• Day 5-6: Practice problems/mock tests\n\
• Day 7: Light review and rest\n\n\
**Tips:**\n\
- Study in 50-minute blocks with 10-minute breaks\n\
- Prioritize difficult subjects during peak energy hours\n\
- Use active recall techniques\n\
- Get 7-8 hours of sleep";

pub const RECURSION: &str = "Recursion is a programming technique where a function calls itself \
to solve a problem by breaking it into smaller, similar subproblems.\n\n\
Key components:\n\
1. **Base case**: The condition that stops the recursion\n\
2. **Recursive case**: The function calling itself with modified parameters\n\n\
Example: Calculating factorial\n\
```\n\
factorial(n) {\n\
\x20 if (n <= 1) return 1; // base case\n\
\x20 return n * factorial(n-1); // recursive case\n\
}\n\
```";

pub struct FallbackRule {
    pub name: &'static str,
    /// Every keyword must appear in the case-folded query.
    pub keywords: &'static [&'static str],
    pub response: &'static str,
}

impl FallbackRule {
    fn matches(&self, folded_query: &str) -> bool {
        self.keywords.iter().all(|keyword| folded_query.contains(keyword))
    }
}

pub static FALLBACK_RULES: &[FallbackRule] = &[
    FallbackRule { name: "library_hours", keywords: &["library"], response: LIBRARY_HOURS },
    FallbackRule {
        name: "study_schedule",
        keywords: &["study", "schedule"],
        response: STUDY_SCHEDULE,
    },
    FallbackRule { name: "recursion", keywords: &["recursion"], response: RECURSION },
];

/// First rule whose keywords all occur in `query`, ignoring case.
pub fn match_rule(query: &str) -> Option<&'static FallbackRule> {
    let folded = query.to_lowercase();
    FALLBACK_RULES.iter().find(|rule| rule.matches(&folded))
}

pub fn clarification(query: &str) -> String {
    format!(
        "I understand you're asking about \"{}\". As a campus AI assistant, I can help with:\n\n\
        • Academic concepts and explanations\n\
        • Campus information and resources\n\
        • Study strategies and tips\n\
        • Project planning and ideas\n\n\
        Could you be more specific about what you'd like to know?",
        query
    )
}

pub fn fallback_reply(query: &str) -> String {
    match match_rule(query) {
        Some(rule) => rule.response.to_string(),
        None => clarification(query),
    }
}
