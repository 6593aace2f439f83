//! System prompts and user prompt builders for the analyst workflows

pub const BRD_SYSTEM: &str = "You are an expert Business Requirements Document (BRD) writer with 15+ years of experience in enterprise software documentation. You create well-structured, professional BRDs with a clear table of contents, numbered sections and organized functional requirements.";

pub const STORY_SYSTEM: &str = "You are an expert Agile product manager and business analyst. Generate well-formed user stories in JSON format.";

pub const EXTRACT_SYSTEM: &str = "You are an expert Agile Product Owner.";

pub const DIAGRAM_SYSTEM: &str = "You are an expert Agile Product Owner and Systems Analyst.";

pub const ANALYSIS_SYSTEM: &str = "You are a Senior Business Analyst Auditor. Return only valid JSON.";

pub const ESTIMATION_SYSTEM: &str = "You are an Agile estimation expert. Provide accurate story point estimates.";

pub const EDITOR_SYSTEM: &str = "You are a precise text editor. Output only the transformed text.";

pub const CHAT_SYSTEM: &str = "You are a helpful AI assistant for a Business Analyst tool. You help users with business analysis tasks, creating user stories, BRDs, diagrams, and documentation. Provide clear, concise, and professional responses.";

/// Character budgets for document bodies sent to the model
pub const ANALYSIS_CHAR_LIMIT: usize = 8000;
pub const EXTRACTION_CHAR_LIMIT: usize = 10000;

const DEFAULT_STRUCTURE: &str = "\
1. Executive Summary
2. Project Overview
   2.1 Background
   2.2 Business Objectives
   2.3 Success Criteria
3. Scope
   3.1 In-Scope
   3.2 Out-of-Scope
4. Stakeholders
5. Functional Requirements
   5.1 Core Features
   5.2 User Stories Breakdown
   5.3 Detailed Feature Specifications
6. Non-Functional Requirements
7. User Interface & Experience
8. Data Requirements
9. Integration Requirements
10. Technical Considerations
11. Assumptions & Constraints
12. Risks & Mitigation
13. Timeline & Milestones
14. Acceptance Criteria
15. Appendix";

const STORY_JSON_SHAPE: &str = r#"[
  {
    "title": "string",
    "description": "As a ... I want ... so that ...",
    "acceptance_criteria": ["criterion", "..."],
    "estimated_points": 3,
    "priority": "P0|P1|P2|P3",
    "business_value": "string"
  }
]"#;

/// First `limit` characters of `text`
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn detail_instruction(detail_level: &str) -> &'static str {
    match detail_level {
        "brief" => "Keep the BRD concise and focused on essentials.",
        "detailed" => "Create a comprehensive BRD with extensive details and examples.",
        _ => "Provide a balanced BRD with all important details.",
    }
}

/// Story text block used inside the BRD prompt
pub struct StoryBrief<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub acceptance_criteria: &'a [String],
    pub priority: &'a str,
}

pub fn brd_prompt(
    stories: &[StoryBrief<'_>],
    template: Option<&str>,
    language: &str,
    detail_level: &str,
    extra_context: Option<&str>,
) -> String {
    let stories_text = stories
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let criteria = s
                .acceptance_criteria
                .iter()
                .map(|c| format!("- {}", c))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "Story {}: {}\nDescription: {}\nAcceptance Criteria:\n{}\nPriority: {}",
                i + 1,
                s.title,
                s.description,
                criteria,
                s.priority
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n");

    let structure = template.unwrap_or(DEFAULT_STRUCTURE);
    let structure_intro = if template.is_some() {
        "Follow this CUSTOM TEMPLATE structure strictly. Fill in any {{variable_names}} from the stories:"
    } else {
        "DOCUMENT STRUCTURE:"
    };

    format!(
        r#"You are creating a professional Business Requirements Document (BRD) from the following user stories.

{stories_text}

PROJECT CONTEXT:
{context}

Language: {language}
Detail Level: {detail_level}
{detail}

{structure_intro}
{structure}

FORMATTING GUIDELINES:
1. Use clear section headings with numbering (1, 1.1, 1.1.1)
2. List each functional requirement with an ID (FR-001), name, description, related stories and acceptance criteria
3. Use tables for stakeholders, the requirements matrix and the timeline
4. Use Markdown for headers, lists, tables and emphasis
"#,
        context = extra_context.unwrap_or("Not specified"),
        detail = detail_instruction(detail_level),
    )
}

pub fn stories_from_requirements_prompt(requirements: &str, count: usize) -> String {
    format!(
        r#"Requirements Text:
{requirements}

Generate exactly {count} user stories from the requirements above.

For each story, provide:
1. A clear title (5-10 words)
2. Description following format: "As a [user type] I want [action] so that [benefit]"
3. 3-5 acceptance criteria
4. Estimated story points (Fibonacci scale: 1, 2, 3, 5, 8, 13, 21)
5. Priority level (P0=Critical, P1=High, P2=Medium, P3=Low)
6. Brief business value explanation

Return ONLY a valid JSON array with this structure:
{STORY_JSON_SHAPE}
"#
    )
}

pub fn stories_from_brd_prompt(content: &str) -> String {
    format!(
        r#"Based on the following Business Requirements Document (BRD), extract a comprehensive list of User Stories.

BRD Content:
{}

Return ONLY a valid JSON array:
{STORY_JSON_SHAPE}
"#,
        truncate_chars(content, EXTRACTION_CHAR_LIMIT)
    )
}

pub fn stories_from_diagram_prompt(diagram_type: &str, code: &str) -> String {
    format!(
        r#"Based on the following Mermaid {diagram_type} diagram, extract the User Stories that can be derived from its logic, flow or structure.
Consider actors, actions, relationships and data flows.

Mermaid Code:
{code}

Return ONLY a valid JSON array:
{STORY_JSON_SHAPE}
"#
    )
}

pub fn analysis_prompt(content: &str) -> String {
    format!(
        r#"Analyze the following Business Requirements Document (BRD) content for:
1. Completeness (Are any key sections missing?)
2. Clarity (Is the language clear and unambiguous?)
3. Consistency (Are there any conflicting requirements?)
4. Professionalism (Does it meet industry standards?)

BRD Content:
{}

Return a structured response in JSON format:
{{
  "score": number (1-100),
  "summary": "string",
  "strengths": ["string"],
  "gaps": ["string"],
  "suggestions": ["string"],
  "risk_level": "Low|Medium|High"
}}
Return ONLY valid JSON.
"#,
        truncate_chars(content, ANALYSIS_CHAR_LIMIT)
    )
}

pub fn estimation_prompt(title: &str, description: &str, criteria: &[String]) -> String {
    format!(
        r#"User Story: {title}
Description: {description}
Acceptance Criteria: {}

Based on the complexity and scope, estimate the story points using the Fibonacci scale (1, 2, 3, 5, 8, 13, 21).
Consider complexity of implementation, number of acceptance criteria, dependencies and unknowns.

Return ONLY a number (1, 2, 3, 5, 8, 13, or 21).
"#,
        criteria.join(", ")
    )
}

pub fn section_prompt(document: &str, section_title: &str, instructions: Option<&str>) -> String {
    format!(
        r#"You are revising one section of a Business Requirements Document (BRD).

SECTION TO REWRITE: {section_title}

INSTRUCTIONS: {}

FULL DOCUMENT FOR CONTEXT:
{}

Return ONLY the rewritten section in Markdown, starting with its heading.
"#,
        instructions.unwrap_or("Improve clarity, completeness and professionalism."),
        truncate_chars(document, EXTRACTION_CHAR_LIMIT)
    )
}

pub fn smart_edit_prompt(text: &str, instruction: &str, context: Option<&str>) -> String {
    let context = context
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("CONTEXT (surrounding text): {}\n", c))
        .unwrap_or_default();

    format!(
        r#"Rewrite the following text from a Business Requirements Document based on the instruction.

INSTRUCTION: {instruction}

ORIGINAL TEXT:
{text}

{context}
RULES:
1. Return ONLY the rewritten text, without conversational filler.
2. Keep the original Markdown formatting unless the instruction implies changing it.
"#
    )
}
