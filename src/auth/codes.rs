use rand::Rng;

/// 6-digit decimal confirmation code, uniform over `000000..=999999`.
/// Leading zeros are kept; codes are compared as strings.
pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}
