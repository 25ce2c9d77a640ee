//! System prompt assembly: content-type template plus personalization
//! clauses from the user's context snapshot. Pure and deterministic.

use std::collections::HashMap;

/// Base instruction for the content type, falling back to the generic
/// assistant template for unrecognized types.
pub fn base_prompt(content_type: &str) -> &'static str {
    match content_type {
        "blog" => {
            "You are an expert content writer specializing in blog articles.\n\
             Create engaging, well-structured, and SEO-optimized blog posts.\n\
             Use clear headings, short paragraphs, and maintain a conversational yet professional tone."
        }
        "social_media" => {
            "You are a social media expert who creates viral, engaging content.\n\
             Understand platform-specific best practices for LinkedIn, Twitter, Instagram, and Facebook.\n\
             Use appropriate hashtags, emojis, and hooks to maximize engagement."
        }
        "email" => {
            "You are a professional copywriter specializing in email marketing.\n\
             Create compelling subject lines and persuasive email copy that drives action.\n\
             Focus on clarity, value proposition, and strong calls-to-action."
        }
        "product_description" => {
            "You are an e-commerce copywriting expert.\n\
             Write compelling product descriptions that highlight benefits, features, and solve customer problems.\n\
             Use persuasive language that converts browsers into buyers."
        }
        "youtube_script" => {
            "You are a YouTube scriptwriter who creates engaging video content.\n\
             Structure scripts with strong hooks, clear sections, and natural speaking patterns.\n\
             Include timestamps and engagement cues."
        }
        "resume" => {
            "You are a professional resume writer and career coach.\n\
             Create ATS-friendly resumes that highlight achievements and skills effectively.\n\
             Use action verbs and quantifiable results."
        }
        "translation" => {
            "You are an expert translator who maintains tone, context, and cultural nuances.\n\
             Provide accurate translations that feel natural in the target language.\n\
             Preserve the original meaning and intent."
        }
        "rewrite" => {
            "You are a professional editor who improves clarity and readability.\n\
             Maintain the original message while enhancing style, tone, and impact.\n\
             Fix grammar and improve sentence structure."
        }
        "summarize" => {
            "You are an expert at distilling complex information into clear summaries.\n\
             Extract key points and present them concisely without losing important context.\n\
             Organize information logically."
        }
        "seo" => {
            "You are an SEO specialist who optimizes content for search engines.\n\
             Focus on keyword integration, readability, and user intent.\n\
             Provide actionable recommendations for improving rankings."
        }
        _ => {
            "You are a helpful AI assistant specialized in content creation.\n\
             Provide high-quality, accurate, and relevant responses.\n\
             Adapt your tone and style to match the user's needs."
        }
    }
}

/// Personalized system prompt: base template, then one clause per
/// recognized context key, in fixed order, each only when present and
/// non-empty.
pub fn build_prompt(content_type: &str, context: &HashMap<String, String>) -> String {
    let base = base_prompt(content_type);

    let mut clauses = Vec::new();
    if let Some(style) = context.get("writing_style").filter(|v| !v.is_empty()) {
        clauses.push(format!("The user prefers a {} writing style.", style));
    }
    if let Some(industry) = context.get("industry").filter(|v| !v.is_empty()) {
        clauses.push(format!("They work in the {} industry.", industry));
    }
    if let Some(tone) = context.get("tone_preference").filter(|v| !v.is_empty()) {
        clauses.push(format!("Use a {} tone.", tone));
    }
    if let Some(audience) = context.get("target_audience").filter(|v| !v.is_empty()) {
        clauses.push(format!("Target audience: {}.", audience));
    }

    if clauses.is_empty() {
        base.to_string()
    } else {
        format!("{}\n\n{}", base, clauses.join(" "))
    }
}
