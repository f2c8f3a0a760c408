use image::DynamicImage;

use super::faces::FaceDetector;

/// Decide whether an image qualifies as a selfie-style portrait.
///
/// The image is reduced to grayscale and handed to the face-detection
/// capability. An image qualifies only when exactly one face candidate is
/// found (zero or multiple candidates both reject, which keeps ambiguous
/// group photos out) and that candidate passes both geometric gates: its
/// center must sit inside the central 30%-70% band of each axis and its
/// box must cover more than 20% of the image area.
///
/// Deterministic for identical pixel input and detector parameters.
pub fn is_selfie(image: &DynamicImage, faces: &dyn FaceDetector) -> bool {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();

    let candidates = faces.detect_faces(gray.as_raw(), width, height);

    let face = match candidates.as_slice() {
        [only] => only,
        _ => return false,
    };

    face.is_centered() && face.is_prominent()
}
