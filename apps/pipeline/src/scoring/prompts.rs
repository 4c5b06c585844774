// Scoring Adapter prompt templates.

pub const SCORING_PROMPT_TEMPLATE: &str = r#"Evaluate the candidate below against the job posting.

JOB TITLE:
{title}

JOB DESCRIPTION:
{description}

RESPONSIBILITIES:
{responsibilities}

REQUIRED SKILLS:
{required_skills}

CANDIDATE NAME:
{candidate_name}

CANDIDATE LINKS:
{links}

{untrusted}

RESUME TEXT:
<<<
{resume_text}
>>>

OUTPUT SCHEMA (return exactly this structure):
{
  "score": number between 0 and 100,
  "status": "SHORTLIST" | "FLAG" | "REJECT",
  "reasoning": "two to four sentences citing concrete evidence from the resume"
}

RULES:
1. SHORTLIST when score >= 70, FLAG when 40 <= score < 70, REJECT when score < 40.
2. Judge only job-relevant qualifications. Ignore name, age, gender, nationality and photos.
3. If the resume text is empty or unreadable, use FLAG and say so in reasoning.
4. Return ONLY the JSON object, nothing else, no code fences."#;
