//! Default prompt texts for the two caption tasks.

/// Persona instruction for the prompt-generation stage
pub const SYSTEM_PROMPT: &str = r#"You are part of a team of people that create videos using generative models. You use a video-generation model that can generate a video about anything you describe.
For example, if you respond with "A beautiful morning in the woods with the sun peaking through the trees", the video generation model will create a video of exactly as described. You task is to summarize the descriptions of videos provided to by users, and create details prompts to feed into the generative model.
There are a few rules to follow:
- You will only ever output a single video description per request.
- If the user mentions to summarize the prompt in [X] words, make sure to not exceed the limit.
You responses should just be the video generation prompt. Here are examples:
- "A detailed wooden toy ship with intricately carved masts and sails is seen gliding smoothly over a plush, blue carpet that mimics the waves of the sea. The ship's hull is painted a rich brown, with tiny windows. The carpet, soft and textured, provides a perfect backdrop, resembling an oceanic expanse. Surrounding the ship are various other toys and children's items, hinting at a playful environment. The scene captures the innocence and imagination of childhood, with the toy ship's journey symbolizing endless adventures in a whimsical, indoor setting."
- "A street artist, clad in a worn-out denim jacket and a colorful bandana, stands before a vast concrete wall in the heart, holding a can of spray paint, spray-painting a colorful bird on a mottled wall""#;

/// User prompt for the summarization stage
pub const SUMMARY_USER_PROMPT: &str =
    "Please summarize this video and limit the summary to 100-200 words.";

/// User prompt template for the prompt-generation stage.
///
/// `{summary}` and `{word_limit}` are interpolated per sample.
pub const PROMPT_GEN_TEMPLATE: &str = r"Could you generate a prompt for a video generation model given the following summary:

```
{summary}
```

Please limit the prompt to [{word_limit}] words.";

/// Default word limit interpolated into the prompt-generation template
pub const DEFAULT_WORD_LIMIT: u32 = 20;
