pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are an expert at extracting structured information from text.
Return only valid JSON. Do not include any explanations or markdown formatting.";

pub fn build_extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract entities and relationships from the following text.

Text:
{}

Extract:
1. Entities: People, places, organizations, concepts, objects mentioned
2. Relationships: How these entities relate to each other

Return a JSON object with this structure:
{{
    "entities": [
        {{"name": "Entity Name", "type": "PERSON|ORGANIZATION|LOCATION|CONCEPT|OTHER"}}
    ],
    "relationships": [
        {{"source": "Entity1", "target": "Entity2", "type": "RELATIONSHIP_TYPE", "description": "brief description"}}
    ]
}}

RULES:
- Only extract entities and relationships that are explicitly mentioned in the text
- Relationship source and target must be names from the entities list
- Output ONLY the JSON object, no markdown, no explanations"#,
        text
    )
}
