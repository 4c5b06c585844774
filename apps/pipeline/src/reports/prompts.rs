// Report analysis prompt templates.

pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Write a hiring report for the job posting below from the scored applicant pool.

JOB TITLE:
{title}

COMPANY:
{company}

REQUIRED SKILLS:
{required_skills}

POOL STATISTICS:
{stats}

{untrusted}

APPLICANTS (one per line: name | email | decision | score | reasoning):
<<<
{candidates}
>>>

OUTPUT SCHEMA (return exactly this structure):
{
  "executive_summary": "three to five sentences on the overall pool",
  "top_candidates": [
    { "name": "string", "email": "string", "score": number or null, "rationale": "one or two sentences" }
  ],
  "role_fit_analysis": "how well the pool matches the role",
  "pool_gaps": ["skill or experience missing across the pool"],
  "recommendations": ["concrete next step for the hiring team"]
}

RULES:
1. top_candidates holds at most 3 entries, chosen from the listed applicants only.
2. Do not invent applicants, scores or qualifications.
3. Return ONLY the JSON object, nothing else, no code fences."#;
