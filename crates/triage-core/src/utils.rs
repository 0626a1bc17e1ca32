//! 通用工具函数

use crate::{Result, TriageError};

/// 患者年龄上限
pub const MAX_PATIENT_AGE: i32 = 120;

/// 校验就诊请求的年龄范围
pub fn validate_age(age: i32) -> Result<()> {
    if (0..=MAX_PATIENT_AGE).contains(&age) {
        Ok(())
    } else {
        Err(TriageError::Validation(format!(
            "Age {} out of range 0..={}",
            age, MAX_PATIENT_AGE
        )))
    }
}

/// 校验症状描述非空
pub fn validate_symptoms(symptoms: &str) -> Result<()> {
    if symptoms.trim().is_empty() {
        Err(TriageError::Validation(
            "Symptom text is required".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// 将置信分收敛到 0..=1
pub fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// 审计视图中对手机号脱敏，仅保留末四位
pub fn mask_phone(phone: Option<&str>) -> String {
    let Some(phone) = phone else {
        return "-".to_string();
    };
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "***".to_string();
    }
    format!("***-***-{}", &digits[digits.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_age() {
        assert!(validate_age(0).is_ok());
        assert!(validate_age(120).is_ok());
        assert!(validate_age(-1).is_err());
        assert!(validate_age(130).is_err());
    }

    #[test]
    fn test_validate_symptoms() {
        assert!(validate_symptoms("chest pain").is_ok());
        assert!(validate_symptoms("   ").is_err());
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone(None), "-");
        assert_eq!(mask_phone(Some("12")), "***");
        assert_eq!(mask_phone(Some("+1 (555) 123-4567")), "***-***-4567");
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.2), 1.0);
        assert_eq!(clamp_confidence(-0.1), 0.0);
        assert_eq!(clamp_confidence(0.8), 0.8);
    }
}
