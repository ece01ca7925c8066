use std::process::ExitStatus;

/// 一般工具的結束碼都落在這個範圍內，超出範圍通常代表程序崩潰
pub const NORMAL_EXIT_CODES: std::ops::RangeInclusive<i32> = 0..=31;

/// 被訊號終止時使用的結束碼
pub const SIGNALLED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Success,
    /// 一般的錯誤結束碼
    Failure(i32),
    /// 結束碼超出正常範圍，或被訊號終止
    ProbableCrash(i32),
}

impl ExitKind {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Self::Success
        } else if NORMAL_EXIT_CODES.contains(&code) {
            Self::Failure(code)
        } else {
            Self::ProbableCrash(code)
        }
    }

    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        Self::from_code(exit_code(status))
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure(code) | Self::ProbableCrash(code) => code,
        }
    }
}

/// 取得結束碼；被訊號終止時回傳 [`SIGNALLED_EXIT_CODE`]
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNALLED_EXIT_CODE)
}
