//! Instruction text sent as the last part of every generation request

use crate::models::Slot;
use crate::resolver::OutfitReferences;

/// Renders the fixed instruction template with the resolved image references.
///
/// Pure function: the only inputs are the reference strings, so the same
/// references always produce byte-identical text.
pub fn assemble(references: &OutfitReferences) -> String {
    let profile = references.profile.to_string();
    let headwear = references.slot(Slot::Headwear).to_string();
    let upper_body = references.slot(Slot::UpperBody).to_string();
    let lower_body = references.slot(Slot::LowerBody).to_string();
    let footwear = references.slot(Slot::Footwear).to_string();
    let accessories = references.slot(Slot::Accessories).to_string();

    format!(
        r#"You are an AI outfit renderer for an image try-on service.

Inputs are given as placeholders that point at the images attached before this text.

1) User inputs
- profile_photo: {profile}

2) Clothing images (lists of images per slot)

- headwear: {headwear}

- upper_body:
  - items: {upper_body}

- lower_body:
  - items: {lower_body}

- footwear: {footwear}

- accessories:
  - items: {accessories}

3) Request context
- request_type: "new_generation"

------------------------------------------------------------
GOAL

Generate 1 high-quality photorealistic image of THE SAME PERSON as in profile_photo, wearing the items provided.

------------------------------------------------------------
HARD RULES

1. Identity & Body
- Preserve the person's identity (face, hair, skin tone) and pose cues from profile_photo.
- Infer gender and body shape directly from profile_photo.

2. Clothing
- Apply 'headwear' if provided.
- Apply ALL 'upper_body' items to the torso, layering them in the order listed (e.g. shirt under jacket).
- Apply ALL 'lower_body' items to the legs, layering them in the order listed.
- Apply 'footwear' to the feet.
- Apply 'accessories' where appropriate.
- For any slot marked {missing}, infer a neutral basic item that matches the outfit to complete the look.

3. Style & Quality
- Clean, professional, photorealistic studio look.
- No artifacts, natural lighting and shadows.
- Anatomically correct proportions.
"#,
        missing = crate::models::NO_IMAGE_PROVIDED,
    )
}
