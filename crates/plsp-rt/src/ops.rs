//! Operators over nullable values. Any null operand makes the result null,
//! except for the three-valued logical connectives.

use plsp_wire::Decimal;

use crate::fault::{PlFault, PlResult};

pub trait Arith: Sized {
    fn add(self, r: Self) -> PlResult<Self>;
    fn sub(self, r: Self) -> PlResult<Self>;
    fn mul(self, r: Self) -> PlResult<Self>;
    fn div(self, r: Self) -> PlResult<Self>;
    fn rem(self, r: Self) -> PlResult<Self>;
    fn neg(self) -> PlResult<Self>;
}

fn overflow(what: &str) -> PlFault {
    PlFault::ValueError(format!("{what} overflow"))
}

macro_rules! int_arith {
    ($($t:ty),*) => {$(
        impl Arith for $t {
            fn add(self, r: Self) -> PlResult<Self> {
                self.checked_add(r).ok_or_else(|| overflow(stringify!($t)))
            }
            fn sub(self, r: Self) -> PlResult<Self> {
                self.checked_sub(r).ok_or_else(|| overflow(stringify!($t)))
            }
            fn mul(self, r: Self) -> PlResult<Self> {
                self.checked_mul(r).ok_or_else(|| overflow(stringify!($t)))
            }
            fn div(self, r: Self) -> PlResult<Self> {
                if r == 0 {
                    return Err(PlFault::ZeroDivide);
                }
                self.checked_div(r).ok_or_else(|| overflow(stringify!($t)))
            }
            fn rem(self, r: Self) -> PlResult<Self> {
                if r == 0 {
                    return Err(PlFault::ZeroDivide);
                }
                self.checked_rem(r).ok_or_else(|| overflow(stringify!($t)))
            }
            fn neg(self) -> PlResult<Self> {
                self.checked_neg().ok_or_else(|| overflow(stringify!($t)))
            }
        }
    )*};
}

int_arith!(i16, i32, i64);

macro_rules! float_arith {
    ($($t:ty),*) => {$(
        impl Arith for $t {
            fn add(self, r: Self) -> PlResult<Self> {
                Ok(self + r)
            }
            fn sub(self, r: Self) -> PlResult<Self> {
                Ok(self - r)
            }
            fn mul(self, r: Self) -> PlResult<Self> {
                Ok(self * r)
            }
            fn div(self, r: Self) -> PlResult<Self> {
                if r == 0.0 {
                    return Err(PlFault::ZeroDivide);
                }
                Ok(self / r)
            }
            fn rem(self, r: Self) -> PlResult<Self> {
                if r == 0.0 {
                    return Err(PlFault::ZeroDivide);
                }
                Ok(self % r)
            }
            fn neg(self) -> PlResult<Self> {
                Ok(-self)
            }
        }
    )*};
}

float_arith!(f32, f64);

/// Decimal as an unscaled integer and a count of fraction digits.
fn scaled(d: &Decimal) -> PlResult<(i128, u32)> {
    let s = d.as_str();
    let (neg, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (int, frac) = body.split_once('.').unwrap_or((body, ""));
    let mant: i128 = format!("{int}{frac}")
        .parse()
        .map_err(|_| overflow("numeric"))?;
    let scale = u32::try_from(frac.len()).map_err(|_| overflow("numeric"))?;
    Ok((if neg { -mant } else { mant }, scale))
}

fn unscaled(mant: i128, scale: u32) -> PlResult<Decimal> {
    let digits = mant.unsigned_abs().to_string();
    let scale = scale as usize;
    let digits = if digits.len() <= scale {
        format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
    } else {
        digits
    };
    let (int, frac) = digits.split_at(digits.len() - scale);
    let sign = if mant < 0 { "-" } else { "" };
    let text = if frac.is_empty() {
        format!("{sign}{int}")
    } else {
        format!("{sign}{int}.{frac}")
    };
    Ok(text.parse()?)
}

fn pow10(n: u32) -> PlResult<i128> {
    10i128.checked_pow(n).ok_or_else(|| overflow("numeric"))
}

fn rescale(mant: i128, from: u32, to: u32) -> PlResult<i128> {
    mant.checked_mul(pow10(to - from)?)
        .ok_or_else(|| overflow("numeric"))
}

fn aligned(l: &Decimal, r: &Decimal) -> PlResult<(i128, i128, u32)> {
    let (lm, ls) = scaled(l)?;
    let (rm, rs) = scaled(r)?;
    let s = ls.max(rs);
    Ok((rescale(lm, ls, s)?, rescale(rm, rs, s)?, s))
}

/// Rounds half away from zero to `scale` fraction digits.
pub fn round_decimal(d: &Decimal, scale: usize) -> PlResult<Decimal> {
    let (mant, s) = scaled(d)?;
    let target = u32::try_from(scale).map_err(|_| overflow("numeric"))?;
    if s <= target {
        return unscaled(rescale(mant, s, target)?, target);
    }
    let div = pow10(s - target)?;
    let q = mant / div;
    let r = (mant % div).abs();
    let q = if r * 2 >= div { q + mant.signum() } else { q };
    unscaled(q, target)
}

impl Arith for Decimal {
    fn add(self, r: Self) -> PlResult<Self> {
        let (l, r, s) = aligned(&self, &r)?;
        unscaled(l.checked_add(r).ok_or_else(|| overflow("numeric"))?, s)
    }

    fn sub(self, r: Self) -> PlResult<Self> {
        let (l, r, s) = aligned(&self, &r)?;
        unscaled(l.checked_sub(r).ok_or_else(|| overflow("numeric"))?, s)
    }

    fn mul(self, r: Self) -> PlResult<Self> {
        let (lm, ls) = scaled(&self)?;
        let (rm, rs) = scaled(&r)?;
        unscaled(lm.checked_mul(rm).ok_or_else(|| overflow("numeric"))?, ls + rs)
    }

    fn div(self, r: Self) -> PlResult<Self> {
        let (rm, _) = scaled(&r)?;
        if rm == 0 {
            return Err(PlFault::ZeroDivide);
        }
        Ok(Decimal::from_f64(self.to_f64() / r.to_f64())?)
    }

    fn rem(self, r: Self) -> PlResult<Self> {
        let (l, r, s) = aligned(&self, &r)?;
        if r == 0 {
            return Err(PlFault::ZeroDivide);
        }
        unscaled(l % r, s)
    }

    fn neg(self) -> PlResult<Self> {
        let (m, s) = scaled(&self)?;
        unscaled(-m, s)
    }
}

fn binary<T>(
    l: Option<T>,
    r: Option<T>,
    f: impl FnOnce(T, T) -> PlResult<T>,
) -> PlResult<Option<T>> {
    match (l, r) {
        (Some(l), Some(r)) => f(l, r).map(Some),
        _ => Ok(None),
    }
}

pub fn op_add<T: Arith>(l: Option<T>, r: Option<T>) -> PlResult<Option<T>> {
    binary(l, r, T::add)
}

pub fn op_sub<T: Arith>(l: Option<T>, r: Option<T>) -> PlResult<Option<T>> {
    binary(l, r, T::sub)
}

pub fn op_mul<T: Arith>(l: Option<T>, r: Option<T>) -> PlResult<Option<T>> {
    binary(l, r, T::mul)
}

pub fn op_div<T: Arith>(l: Option<T>, r: Option<T>) -> PlResult<Option<T>> {
    binary(l, r, T::div)
}

pub fn op_mod<T: Arith>(l: Option<T>, r: Option<T>) -> PlResult<Option<T>> {
    binary(l, r, T::rem)
}

pub fn op_neg<T: Arith>(v: Option<T>) -> PlResult<Option<T>> {
    v.map(T::neg).transpose()
}

fn compare<T: PartialOrd>(l: Option<T>, r: Option<T>, f: impl FnOnce(&T, &T) -> bool) -> Option<bool> {
    match (l, r) {
        (Some(l), Some(r)) => Some(f(&l, &r)),
        _ => None,
    }
}

pub fn op_eq<T: PartialOrd>(l: Option<T>, r: Option<T>) -> Option<bool> {
    compare(l, r, |l, r| l == r)
}

pub fn op_ne<T: PartialOrd>(l: Option<T>, r: Option<T>) -> Option<bool> {
    compare(l, r, |l, r| l != r)
}

pub fn op_lt<T: PartialOrd>(l: Option<T>, r: Option<T>) -> Option<bool> {
    compare(l, r, |l, r| l < r)
}

pub fn op_le<T: PartialOrd>(l: Option<T>, r: Option<T>) -> Option<bool> {
    compare(l, r, |l, r| l <= r)
}

pub fn op_gt<T: PartialOrd>(l: Option<T>, r: Option<T>) -> Option<bool> {
    compare(l, r, |l, r| l > r)
}

pub fn op_ge<T: PartialOrd>(l: Option<T>, r: Option<T>) -> Option<bool> {
    compare(l, r, |l, r| l >= r)
}

pub fn op_and(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

pub fn op_or(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

pub fn op_not(v: Option<bool>) -> Option<bool> {
    v.map(|b| !b)
}

pub fn op_is_null<T>(v: Option<T>) -> Option<bool> {
    Some(v.is_none())
}

pub fn op_concat(l: Option<String>, r: Option<String>) -> Option<String> {
    match (l, r) {
        (None, None) => None,
        (l, r) => Some(l.unwrap_or_default() + r.as_deref().unwrap_or("")),
    }
}

pub fn op_between<T: PartialOrd + Clone>(v: Option<T>, lo: Option<T>, hi: Option<T>) -> Option<bool> {
    op_and(op_ge(v.clone(), lo), op_le(v, hi))
}

pub fn op_in<T: PartialOrd>(v: Option<T>, list: Vec<Option<T>>) -> Option<bool> {
    let v = v?;
    let mut saw_null = false;
    for item in list {
        match item {
            Some(item) if item == v => return Some(true),
            Some(_) => {}
            None => saw_null = true,
        }
    }
    if saw_null {
        None
    } else {
        Some(false)
    }
}

/// SQL LIKE with `%` and `_` wildcards.
pub fn op_like(s: Option<String>, pattern: Option<String>) -> Option<bool> {
    let s: Vec<char> = s?.chars().collect();
    let p: Vec<char> = pattern?.chars().collect();
    Some(like_match(&s, &p))
}

fn like_match(s: &[char], p: &[char]) -> bool {
    let (mut si, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while si < s.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == s[si]) {
            si += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, si));
            pi += 1;
        } else if let Some((bp, bs)) = backtrack {
            pi = bp + 1;
            si = bs + 1;
            backtrack = Some((bp, bs + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}

/// Condition value of IF/WHILE/EXIT WHEN: null counts as false.
pub fn truthy(v: Option<bool>) -> bool {
    v == Some(true)
}
