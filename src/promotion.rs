/// Computes the grade a student moves to at promotion time, or `None`
/// when the current grade is unknown or the step would pass the top of
/// the order. Fee and enrollment updates are the caller's concern.
pub fn next_grade<'a>(
    current: &str,
    order: &'a [String],
    double_promotion: bool,
) -> Option<&'a str> {
    let idx = order.iter().position(|g| g == current)?;
    let step = if double_promotion { 2 } else { 1 };
    order.get(idx + step).map(|g| g.as_str())
}
